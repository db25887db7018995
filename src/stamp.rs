//! Bates stamping pass over a finished volume.
//!
//! Every image under `<volume>/IMAGES` is named after its Bates number, so the stamp
//! text is simply the file stem. Failures are counted and logged; the pass never stops
//! early.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::collaborators::Stamper;
use crate::config::StampConfig;
use crate::io::glob::files_under;
use crate::io::layout::VolumeLayout;

/// Tally of one stamping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampSummary {
    pub stamped: usize,
    pub failed: usize,
    /// Files skipped because their extension is not in `supported_formats`.
    pub unsupported: usize,
}

/// Stamp every supported image in the volume with its own Bates number.
///
/// # Errors
///
/// Returns an error only if the images directory cannot be listed.
pub fn stamp_volume(
    layout: &VolumeLayout,
    stamper: &Arc<dyn Stamper>,
    config: &StampConfig,
) -> Result<StampSummary> {
    let images = layout.images_dir();
    let mut summary = StampSummary::default();
    if !images.is_dir() {
        return Ok(summary);
    }

    for path in files_under(&images)? {
        let supported = path
            .extension()
            .is_some_and(|e| config.supports(&e.to_string_lossy()));
        if !supported {
            summary.unsupported += 1;
            continue;
        }
        let Some(text) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        match stamper.stamp(&path, &text, config) {
            Ok(()) => summary.stamped += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    image = %path.display(),
                    bates = %text,
                    error = %format!("{e:#}"),
                    "Stamping failed"
                );
            }
        }
    }

    tracing::info!(
        stamped = summary.stamped,
        failed = summary.failed,
        unsupported = summary.unsupported,
        "Stamping pass complete"
    );
    Ok(summary)
}
