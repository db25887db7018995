//! Testing utilities for production runs.
//!
//! - **Fakes**: in-memory [`Extractor`](crate::collaborators::Extractor),
//!   [`Rasterizer`](crate::collaborators::Rasterizer), and
//!   [`Stamper`](crate::collaborators::Stamper) implementations that can be told to fail
//!   or stall for particular files.
//! - **Fixtures**: [`InputFixture`] for a throwaway input folder and output directory,
//!   and [`test_config`] for a small, fast configuration.
//! - **Assertions**: checks for the Bates and required-field invariants.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ironbates::runner::ProductionRunner;
//! use ironbates::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let fx = InputFixture::new()?.file("a.txt", "hello")?;
//! let runner = ProductionRunner::new(
//!     test_config("ABC", 1000, 6),
//!     Arc::new(FakeExtractor::new()),
//!     Arc::new(FakeRasterizer::new()),
//! );
//! let out = runner.run(fx.input(), fx.output())?;
//! assert_gapless(&out.records, 1000);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fakes;
pub mod fixtures;

pub use assertions::*;
pub use fakes::*;
pub use fixtures::*;
