//! On-disk layout of a production volume.
//!
//! ```text
//! <output>/<volume>/
//!     NATIVES/0000/<Bates>.<ext>
//!     IMAGES/0000/<Bates>.<ext>      natives that are images, and rendered pages (.tiff)
//!     TEXT/0000/<Bates>.txt
//!     DATA/loadfile.dat
//!     DATA/<volume>.opt
//!     DATA/integrity_report.json
//! ```
//!
//! Locations written into the loadfile and page index are relative to `<output>`, start
//! with the volume name, and always use `/` separators.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::bates::BatesNumber;

const FOLDER: &str = "0000";

/// Paths for one volume under an output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    output_dir: PathBuf,
    volume: String,
}

impl VolumeLayout {
    pub fn new(output_dir: impl Into<PathBuf>, volume: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            volume: volume.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    /// `<output>/<volume>`
    pub fn root(&self) -> PathBuf {
        self.output_dir.join(&self.volume)
    }

    pub fn natives_dir(&self) -> PathBuf {
        self.root().join("NATIVES").join(FOLDER)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root().join("IMAGES")
    }

    pub fn text_dir(&self) -> PathBuf {
        self.root().join("TEXT").join(FOLDER)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("DATA")
    }

    pub fn loadfile_path(&self) -> PathBuf {
        self.data_dir().join("loadfile.dat")
    }

    pub fn opt_path(&self) -> PathBuf {
        self.data_dir().join(format!("{}.opt", self.volume))
    }

    pub fn report_path(&self) -> PathBuf {
        self.data_dir().join("integrity_report.json")
    }

    /// Relative location for a stored native. Image extensions go under `IMAGES`.
    ///
    /// The extension is lowercased and `tif` is spelled `tiff`, so a TIFF native always
    /// shares its path with the document's page 0 image.
    pub fn native_location(&self, bates: &BatesNumber, extension: &str) -> String {
        let mut ext = extension.to_ascii_lowercase();
        if ext == "tif" {
            ext = "tiff".to_string();
        }
        let sub = if is_image_native(&ext) { "IMAGES" } else { "NATIVES" };
        if ext.is_empty() {
            format!("{}/{sub}/{FOLDER}/{bates}", self.volume)
        } else {
            format!("{}/{sub}/{FOLDER}/{bates}.{ext}", self.volume)
        }
    }

    pub fn text_location(&self, bates: &BatesNumber) -> String {
        format!("{}/TEXT/{FOLDER}/{bates}.txt", self.volume)
    }

    /// Relative location for a rendered page image.
    pub fn page_location(&self, page: &BatesNumber) -> String {
        format!("{}/IMAGES/{FOLDER}/{page}.tiff", self.volume)
    }

    /// Absolute path for a relative location produced by this layout.
    pub fn resolve(&self, location: &str) -> PathBuf {
        location
            .split('/')
            .fold(self.output_dir.clone(), |path, part| path.join(part))
    }

    /// Remove any existing volume directory and create a fresh skeleton.
    ///
    /// Failure to remove the old directory is logged and the run continues on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn prepare(&self) -> Result<()> {
        let root = self.root();
        if root.exists() {
            tracing::info!(volume = %root.display(), "Removing existing volume directory");
            if let Err(e) = std::fs::remove_dir_all(&root) {
                tracing::warn!(
                    volume = %root.display(),
                    error = %e,
                    "Could not remove existing volume directory, continuing"
                );
            }
        }
        for dir in [
            self.natives_dir(),
            self.images_dir().join(FOLDER),
            self.text_dir(),
            self.data_dir(),
        ] {
            std::fs::create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Natives with these extensions are stored under `IMAGES` instead of `NATIVES`.
pub fn is_image_native(extension: &str) -> bool {
    matches!(
        extension.to_ascii_lowercase().as_str(),
        "tif" | "tiff" | "jpg" | "jpeg" | "png"
    )
}
