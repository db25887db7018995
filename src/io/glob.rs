//! Input discovery.
//!
//! Walks an input directory recursively and returns every regular file in canonical
//! production order (see [`sort_inputs`]).
//!
//! ```no_run
//! use ironbates::io::glob::discover_inputs;
//!
//! let files = discover_inputs("incoming/custodian_a")?;
//! # use anyhow::Error; Ok::<(), Error>(())
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use glob::glob;

use crate::bates::sort_inputs;
use crate::error::ProductionError;

/// Extensions never produced.
const SKIPPED_EXTENSIONS: &[&str] = &["jar"];

/// Expand a glob pattern into the matching regular files, sorted by path.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or an entry cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// Every regular file under `dir`, recursively, sorted by path.
///
/// # Errors
///
/// Returns an error if `dir` is not valid UTF-8 or cannot be walked.
pub fn files_under(dir: &Path) -> Result<Vec<PathBuf>> {
    let root = dir
        .to_str()
        .with_context(|| format!("path is not valid UTF-8: {}", dir.display()))?;
    expand_glob(&format!("{}/**/*", glob::Pattern::escape(root.trim_end_matches('/'))))
}

/// Every producible file under `dir`, recursively, in production order.
///
/// # Errors
///
/// Returns [`ProductionError::InputNotFound`] if `dir` is not a directory, or an error if
/// the directory cannot be walked.
pub fn discover_inputs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        bail!(ProductionError::InputNotFound(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = files_under(dir)?
        .into_iter()
        .filter(|p| !is_skipped(p))
        .collect();
    sort_inputs(&mut files);

    tracing::info!(dir = %dir.display(), files = files.len(), "Discovered input files");
    Ok(files)
}

fn is_skipped(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        let ext = ext.to_string_lossy();
        SKIPPED_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s))
    })
}
