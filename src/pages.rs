//! Multi-page expansion.
//!
//! A paginated document (PDF, multi-frame TIFF) produces one raster image and one page
//! index entry per page. Page `i` (zero-based) is numbered `base + i` with the file's
//! prefix and width, so page 0 shares the document's BegBates.
//!
//! Pages are rendered `chunk_size` at a time and each chunk's buffers are released
//! before the next is requested. A failed chunk is logged and its pages are skipped;
//! later chunks still render.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bates::BatesNumber;
use crate::collaborators::{Deadline, Rasterizer, call_with_timeout};
use crate::config::ProcessingConfig;
use crate::error::{Phase, ProductionError};
use crate::family::file_name;
use crate::io::layout::VolumeLayout;
use crate::metadata::FormatTag;

/// One line of the page index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    pub bates: BatesNumber,
    pub volume: String,
    /// Image location relative to the output directory.
    pub image_path: String,
    pub first_page: bool,
    /// Total pages in the document; only set on the first page.
    pub page_count: Option<u32>,
    /// BegBates of the document this page belongs to.
    pub document: BatesNumber,
    /// Zero-based page index within the document.
    pub page: u32,
}

impl PageEntry {
    /// Index order: owning document, then page within it. Page numbers alone can
    /// repeat when a document's pages run into the next document's range.
    pub fn order_key(&self) -> (&BatesNumber, u32) {
        (&self.document, self.page)
    }

    /// The six page-index fields: bates, volume, path, first-page flag, an empty
    /// reserved field, page count.
    pub fn opt_fields(&self) -> [String; 6] {
        [
            self.bates.to_string(),
            self.volume.clone(),
            self.image_path.clone(),
            if self.first_page { "Y".to_string() } else { String::new() },
            String::new(),
            self.page_count.map(|n| n.to_string()).unwrap_or_default(),
        ]
    }
}

/// Pages produced for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExpansion {
    pub entries: Vec<PageEntry>,
    /// Pages the rasterizer reported, rendered or not.
    pub page_count: u32,
    pub failed_chunks: usize,
    /// Highest page number actually written.
    pub last_page: Option<BatesNumber>,
}

impl PageExpansion {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0 && self.entries.len() == self.page_count as usize
    }
}

/// What to expand.
#[derive(Debug, Clone, Copy)]
pub struct PageJob<'a> {
    pub path: &'a Path,
    pub base: &'a BatesNumber,
    pub format: FormatTag,
    /// Distance to the next document's base number, if there is one.
    pub gap_after: Option<u64>,
}

/// Renders paginated documents into page images and page index entries.
#[derive(Debug, Clone, Copy)]
pub struct PageExpander {
    dpi: u32,
    chunk_size: u32,
    call_timeout: Duration,
}

impl PageExpander {
    pub fn new(dpi: u32, chunk_size: u32, call_timeout: Duration) -> Self {
        Self {
            dpi,
            chunk_size: chunk_size.max(1),
            call_timeout,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.pdf_dpi, config.pdf_chunk_size, config.extract_timeout())
    }

    /// Expand `job` into page images under `layout`.
    ///
    /// Non-paginated formats produce an empty expansion.
    ///
    /// # Errors
    ///
    /// Returns an error only if the page count cannot be obtained. Render and write
    /// failures skip the affected chunk and are counted in
    /// [`PageExpansion::failed_chunks`].
    pub fn expand(
        &self,
        job: PageJob<'_>,
        rasterizer: &Arc<dyn Rasterizer>,
        layout: &VolumeLayout,
        deadline: &Deadline,
    ) -> Result<PageExpansion, ProductionError> {
        if !job.format.is_paginated() {
            return Ok(PageExpansion::default());
        }

        let name = file_name(job.path);
        let page_count = {
            let r = Arc::clone(rasterizer);
            let path = job.path.to_path_buf();
            call_with_timeout(Phase::Rasterize, &name, deadline.cap(self.call_timeout), move || {
                r.page_count(&path)
            })?
        };

        let mut out = PageExpansion {
            page_count,
            ..PageExpansion::default()
        };
        if page_count == 0 {
            return Ok(out);
        }

        if let Some(gap) = job.gap_after
            && u64::from(page_count) > gap
        {
            tracing::warn!(
                file = %name,
                bates = %job.base,
                pages = page_count,
                last_page = %job.base.offset(u64::from(page_count) - 1),
                next_document = %job.base.offset(gap),
                "Page numbers overlap the next document's Bates range"
            );
        }

        tracing::debug!(file = %name, pages = page_count, chunk = self.chunk_size, "Expanding pages");

        let mut start = 0;
        while start < page_count {
            let end = start.saturating_add(self.chunk_size).min(page_count);
            let chunk = ChunkRequest {
                job: &job,
                name: &name,
                pages: start..end,
                total: page_count,
            };
            match self.render_chunk(chunk, rasterizer, layout, deadline) {
                Ok(entries) => {
                    if let Some(last) = entries.last() {
                        out.last_page = Some(last.bates.clone());
                    }
                    out.entries.extend(entries);
                }
                Err(e) => {
                    out.failed_chunks += 1;
                    tracing::warn!(
                        file = %name,
                        first_page = start + 1,
                        last_page = end,
                        error = %format!("{e:#}"),
                        "Page chunk failed, skipping its pages"
                    );
                }
            }
            start = end;
        }

        Ok(out)
    }

    fn render_chunk(
        &self,
        chunk: ChunkRequest<'_>,
        rasterizer: &Arc<dyn Rasterizer>,
        layout: &VolumeLayout,
        deadline: &Deadline,
    ) -> Result<Vec<PageEntry>> {
        let ChunkRequest {
            job,
            name,
            pages,
            total,
        } = chunk;
        let r = Arc::clone(rasterizer);
        let path = job.path.to_path_buf();
        let dpi = self.dpi;
        let range = pages.clone();
        let rendered = call_with_timeout(
            Phase::Rasterize,
            name,
            deadline.cap(self.call_timeout),
            move || r.render(&path, dpi, range),
        )?;

        let expected = (pages.end - pages.start) as usize;
        if rendered.len() != expected {
            tracing::warn!(
                file = %name,
                expected,
                rendered = rendered.len(),
                "Rasterizer returned an unexpected number of pages"
            );
        }

        let mut entries = Vec::with_capacity(expected);
        for (page, raster) in pages.zip(rendered) {
            let bates = job.base.offset(u64::from(page));
            let location = layout.page_location(&bates);
            let target = layout.resolve(&location);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("mkdir -p {}", parent.display()))?;
            }
            std::fs::write(&target, &raster.bytes)
                .with_context(|| format!("write page image {}", target.display()))?;

            entries.push(PageEntry {
                bates,
                volume: layout.volume().to_string(),
                image_path: location,
                first_page: page == 0,
                page_count: None,
                document: job.base.clone(),
                page,
            });
        }
        if let Some(first) = entries.first_mut()
            && first.first_page
        {
            first.page_count = Some(total);
        }
        Ok(entries)
    }
}

/// Put page entries in index order, keeping each document's pages together.
pub fn sort_pages(entries: &mut [PageEntry]) {
    entries.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}

struct ChunkRequest<'a> {
    job: &'a PageJob<'a>,
    name: &'a str,
    pages: Range<u32>,
    total: u32,
}
