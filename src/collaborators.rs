//! Seams to the external collaborators: text/metadata extraction, page rasterization,
//! and stamping.
//!
//! The pipeline never parses a PDF or draws on an image itself. It calls these traits
//! and treats every call as fallible and potentially slow. [`call_with_timeout`] runs a
//! call on a helper thread and waits for it with a deadline; a call that overruns is
//! reported as [`ProductionError::Timeout`] but is not interrupted.

use std::ops::Range;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;

use crate::config::StampConfig;
use crate::error::{Phase, ProductionError};
use crate::metadata::RawMetadata;

/// What an extractor returns for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub metadata: RawMetadata,
    /// Extracted body text, if the format has any.
    pub content: Option<String>,
}

/// One rendered page, already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    pub bytes: Vec<u8>,
}

/// Raw metadata and text extraction.
pub trait Extractor: Send + Sync {
    /// Extract metadata and body text from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed.
    fn extract(&self, path: &Path) -> Result<ExtractedDocument>;
}

/// Page rendering for paginated formats.
pub trait Rasterizer: Send + Sync {
    /// Number of pages in the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be opened.
    fn page_count(&self, path: &Path) -> Result<u32>;

    /// Render the zero-based page range `pages` at `dpi`, one entry per page in order.
    ///
    /// # Errors
    ///
    /// Returns an error if any page in the range fails to render.
    fn render(&self, path: &Path, dpi: u32, pages: Range<u32>) -> Result<Vec<RasterPage>>;
}

/// Draws a text overlay onto an image file in place.
pub trait Stamper: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the image cannot be read or rewritten.
    fn stamp(&self, image_path: &Path, text: &str, config: &StampConfig) -> Result<()>;
}

/// Run `f` on a helper thread and wait at most `timeout` for its result.
///
/// A collaborator error becomes [`ProductionError::Collaborator`], a panic on the helper
/// thread is reported the same way, and an overrun becomes [`ProductionError::Timeout`].
/// An overrunning call keeps running in the background; its result is discarded.
///
/// # Errors
///
/// See above. Also returns [`ProductionError::Io`] if the helper thread cannot be
/// spawned.
pub fn call_with_timeout<T, F>(
    phase: Phase,
    file: &str,
    timeout: Duration,
    f: F,
) -> Result<T, ProductionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    if timeout.is_zero() {
        return Err(ProductionError::Timeout {
            phase,
            file: file.to_string(),
            after: timeout,
        });
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::Builder::new()
        .name(format!("{phase}-call"))
        .spawn(move || {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(f());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ProductionError::Collaborator {
            phase,
            file: file.to_string(),
            message: format!("{e:#}"),
        }),
        Err(RecvTimeoutError::Timeout) => Err(ProductionError::Timeout {
            phase,
            file: file.to_string(),
            after: timeout,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(ProductionError::Collaborator {
            phase,
            file: file.to_string(),
            message: "collaborator panicked".to_string(),
        }),
    }
}

/// Time budget for all collaborator work on one file.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
        }
    }

    pub fn at(end: Instant) -> Self {
        Self { end }
    }

    pub fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// How long a single call may wait: the per-call limit, capped by what is left.
    pub fn cap(&self, per_call: Duration) -> Duration {
        per_call.min(self.remaining())
    }

    /// The earlier of two deadlines.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if other.end < self.end { other } else { self }
    }
}

/// Extractor that reads files straight from disk.
///
/// Plain-text files (`txt`, `csv`, `eml`, and anything else that decodes as UTF-8)
/// yield their text as content. For `eml`, the RFC 822 header block is parsed into
/// metadata. Every file reports its modification time as `Last-Modified`. Binary
/// formats come back with no content; real deployments supply a proper extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsExtractor;

impl Extractor for FsExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let mut metadata = RawMetadata::new();

        if let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            metadata.insert("Last-Modified", modified.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        }

        let content = String::from_utf8(bytes).ok();
        let is_eml = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("eml"));

        let content = match content {
            Some(text) if is_eml => {
                let (headers, body) = split_headers(&text);
                for (key, value) in headers {
                    metadata.insert(key, value);
                }
                Some(body.to_string())
            }
            other => other,
        };

        Ok(ExtractedDocument { metadata, content })
    }
}

/// Split an RFC 822 message into unfolded headers and body.
fn split_headers(text: &str) -> (Vec<(String, String)>, &str) {
    let (head, body) = text
        .split_once("\r\n\r\n")
        .or_else(|| text.split_once("\n\n"))
        .unwrap_or((text, ""));

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    (headers, body)
}
