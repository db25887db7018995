//! # Ironbates
//!
//! Turns a folder of heterogeneous documents into a **legal production volume**: every
//! file gets a Bates number, its native and text are stored in a fixed folder layout,
//! multi-page documents are expanded into per-page images, and the run emits a
//! delimited loadfile, an image cross-reference (OPT) file, and an integrity report.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ironbates::collaborators::FsExtractor;
//! use ironbates::config::ProductionConfig;
//! use ironbates::runner::ProductionRunner;
//! use ironbates::testing::FakeRasterizer;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let config = ProductionConfig::from_json_file("production.json")?;
//! let runner = ProductionRunner::new(config, Arc::new(FsExtractor), Arc::new(FakeRasterizer::new()));
//! let out = runner.run("input/", "output/")?;
//! println!("{} files produced, {} failed", out.summary.processed, out.summary.failed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. [`io::discover_inputs`] lists and sorts the input files.
//! 2. [`bates::BatesAllocator`] hands out one Bates number per file, in sorted order.
//! 3. [`family::FamilyResolver`] groups email threads in a bounded pre-pass, then
//!    falls back to filename heuristics per file.
//! 4. Workers extract metadata, [`pages::PageExpander`] renders paginated files, and
//!    [`record::ProductionRecordBuilder`] stores natives and text.
//! 5. [`io::write_loadfile`] and [`io::write_opt`] serialize the volume.
//! 6. [`validation::IntegrityValidator`] re-reads the artifacts and reports.
//!
//! Extraction, rasterization, and stamping are pluggable through the traits in
//! [`collaborators`]. Every collaborator call runs under a deadline.
//!
//! ## Output Layout
//!
//! ```text
//! <output>/<VOLUME>/
//!     NATIVES/0000/ABC001000.eml
//!     IMAGES/0000/ABC001001.tiff
//!     TEXT/0000/ABC001000.txt
//!     DATA/loadfile.dat
//!     DATA/<VOLUME>.opt
//!     DATA/integrity_report.json
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel-io` - Format loadfile rows in parallel with Rayon before writing
//!
//! ## Logging
//!
//! The crate logs through `tracing`. Binaries can call [`init_tracing`] to install a
//! formatter that honors `RUST_LOG` (default `info`).

pub mod bates;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod family;
pub mod io;
pub mod metadata;
pub mod metrics;
pub mod pages;
pub mod record;
pub mod runner;
pub mod stamp;
pub mod state;
pub mod testing;
pub mod validation;

pub use bates::{BatesAllocator, BatesFormat, BatesNumber};
pub use collaborators::{Deadline, ExtractedDocument, Extractor, RasterPage, Rasterizer, Stamper};
pub use config::ProductionConfig;
pub use error::{Phase, ProductionError};
pub use family::{FamilyAssignment, FamilyRegistry, FamilyResolver};
pub use io::{VolumeLayout, read_loadfile, read_opt, write_loadfile, write_opt};
pub use metadata::{NormalizedMetadata, RawMetadata, SchemaField};
pub use pages::{PageEntry, PageExpander};
pub use record::{LoadfileColumn, ProductionRecord, ProductionRecordBuilder};
pub use runner::{ProductionRunner, RunOutput, RunSummary};
pub use validation::{Check, IntegrityReport, IntegrityValidator};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
