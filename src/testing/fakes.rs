//! In-memory collaborators.
//!
//! Each fake is keyed by file name (not full path), records the calls it receives, and
//! can be told to fail or stall for particular files.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::collaborators::{ExtractedDocument, Extractor, RasterPage, Rasterizer, Stamper};
use crate::config::StampConfig;
use crate::family::file_name;
use crate::metadata::RawMetadata;

/// Extractor returning canned documents.
///
/// Files without a canned document extract to empty metadata and no content.
///
/// ```
/// use ironbates::testing::FakeExtractor;
/// use ironbates::metadata::RawMetadata;
///
/// let extractor = FakeExtractor::new()
///     .with_metadata("a.eml", RawMetadata::new().with("Thread-Index", "T1"))
///     .failing("broken.pdf");
/// ```
#[derive(Debug, Default)]
pub struct FakeExtractor {
    docs: HashMap<String, ExtractedDocument>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(mut self, name: &str, doc: ExtractedDocument) -> Self {
        self.docs.insert(name.to_string(), doc);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, name: &str, metadata: RawMetadata) -> Self {
        self.docs.entry(name.to_string()).or_default().metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_content(mut self, name: &str, content: &str) -> Self {
        self.docs.entry(name.to_string()).or_default().content = Some(content.to_string());
        self
    }

    /// Make extraction of `name` fail.
    #[must_use]
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Make extraction of `name` sleep for `delay` first.
    #[must_use]
    pub fn stalling(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// File names extracted so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Extractor for FakeExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument> {
        let name = file_name(path);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.clone());
        if let Some(delay) = self.delays.get(&name) {
            std::thread::sleep(*delay);
        }
        if self.failing.contains(&name) {
            bail!("fake extraction failure for {name}");
        }
        Ok(self.docs.get(&name).cloned().unwrap_or_default())
    }
}

/// Rasterizer with fixed page counts. Page images are the bytes `"<name>#<page>"`.
#[derive(Debug, Default)]
pub struct FakeRasterizer {
    pages: HashMap<String, u32>,
    /// Zero-based page numbers whose chunk fails to render.
    failing_pages: HashMap<String, HashSet<u32>>,
    failing_count: HashSet<String>,
    renders: Mutex<Vec<(String, Range<u32>)>>,
}

impl FakeRasterizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pages(mut self, name: &str, pages: u32) -> Self {
        self.pages.insert(name.to_string(), pages);
        self
    }

    /// Any chunk containing zero-based `page` of `name` fails.
    #[must_use]
    pub fn failing_page(mut self, name: &str, page: u32) -> Self {
        self.failing_pages
            .entry(name.to_string())
            .or_default()
            .insert(page);
        self
    }

    /// Page counting fails for `name`.
    #[must_use]
    pub fn failing_count(mut self, name: &str) -> Self {
        self.failing_count.insert(name.to_string());
        self
    }

    /// Render calls so far, in call order.
    pub fn renders(&self) -> Vec<(String, Range<u32>)> {
        self.renders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Rasterizer for FakeRasterizer {
    fn page_count(&self, path: &Path) -> Result<u32> {
        let name = file_name(path);
        if self.failing_count.contains(&name) {
            bail!("fake page count failure for {name}");
        }
        Ok(self.pages.get(&name).copied().unwrap_or(1))
    }

    fn render(&self, path: &Path, _dpi: u32, pages: Range<u32>) -> Result<Vec<RasterPage>> {
        let name = file_name(path);
        self.renders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.clone(), pages.clone()));
        if let Some(bad) = self.failing_pages.get(&name)
            && pages.clone().any(|p| bad.contains(&p))
        {
            bail!("fake render failure for {name} pages {pages:?}");
        }
        Ok(pages
            .map(|p| RasterPage {
                bytes: format!("{name}#{p}").into_bytes(),
            })
            .collect())
    }
}

/// Stamper that records what it was asked to stamp without touching the image.
#[derive(Debug, Default)]
pub struct FakeStamper {
    failing: HashSet<String>,
    stamps: Mutex<Vec<(PathBuf, String)>>,
}

impl FakeStamper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamping the image named `name` fails.
    #[must_use]
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// `(image, text)` pairs stamped so far, sorted by text.
    pub fn stamps(&self) -> Vec<(PathBuf, String)> {
        let mut out = self
            .stamps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }
}

impl Stamper for FakeStamper {
    fn stamp(&self, image_path: &Path, text: &str, _config: &StampConfig) -> Result<()> {
        let name = file_name(image_path);
        if self.failing.contains(&name) {
            bail!("fake stamp failure for {name}");
        }
        self.stamps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((image_path.to_path_buf(), text.to_string()));
        Ok(())
    }
}
