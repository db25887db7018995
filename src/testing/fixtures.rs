//! Temporary input folders and output volumes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::config::ProductionConfig;

/// A temporary input directory plus a temporary output directory.
///
/// ```
/// use ironbates::testing::InputFixture;
///
/// # fn main() -> anyhow::Result<()> {
/// let fx = InputFixture::new()?
///     .file("a.eml", "Subject: hi\n\nbody")?
///     .file("nested/b.pdf", "%PDF-1.4")?;
/// assert!(fx.input().join("nested/b.pdf").is_file());
/// # Ok(())
/// # }
/// ```
pub struct InputFixture {
    input: TempDir,
    output: TempDir,
}

impl InputFixture {
    /// # Errors
    ///
    /// Returns an error if the temporary directories cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            input: TempDir::new().context("create input dir")?,
            output: TempDir::new().context("create output dir")?,
        })
    }

    /// Add a file under the input directory, creating parent folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn file(self, relative: &str, contents: impl AsRef<[u8]>) -> Result<Self> {
        self.write(relative, contents)?;
        Ok(self)
    }

    /// Like [`InputFixture::file`], returning the new file's path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, relative: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.input.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn input(&self) -> &Path {
        self.input.path()
    }

    pub fn output(&self) -> &Path {
        self.output.path()
    }
}

/// Configuration with the given Bates numbering and otherwise default settings.
#[must_use]
pub fn test_config(prefix: &str, start: u64, digits: usize) -> ProductionConfig {
    let mut config = ProductionConfig::default();
    config.volume_name = "TEST_VOL".to_string();
    config.custodian = "Test Custodian".to_string();
    config.bates.prefix = prefix.to_string();
    config.bates.start = start;
    config.bates.digits = digits;
    config.processing.max_total_timeout = 60;
    config.processing.max_file_timeout = 30;
    config.processing.timeout = 10;
    config.processing.family_pass_timeout = 10;
    config
}
