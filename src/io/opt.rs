//! Page index (`.opt`) writer and reader.
//!
//! One comma-separated line per page: `bates,volume,path,first_page,,page_count`. There
//! is no quoting or escaping, so a value containing a comma is refused rather than
//! written.

use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::ProductionError;
use crate::pages::PageEntry;

/// Write `entries` to `path`, each document's pages together in document order.
/// Returns the number of lines.
///
/// # Errors
///
/// Returns [`ProductionError::Serialization`] if a value contains a comma, or an error
/// if the file cannot be written.
pub fn write_opt(path: impl AsRef<Path>, entries: &[PageEntry]) -> Result<usize> {
    let path = path.as_ref();

    let mut sorted: Vec<&PageEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

    let rows: Vec<[String; 6]> = sorted.iter().map(|e| e.opt_fields()).collect();
    for row in &rows {
        if let Some(bad) = row.iter().find(|v| v.contains(',')) {
            bail!(ProductionError::Serialization(format!(
                "page index value {bad:?} contains a comma"
            )));
        }
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_path(path)
        .with_context(|| format!("create {}", path.display()))?;
    for row in &rows {
        wtr.write_record(row)
            .with_context(|| format!("write page index line to {}", path.display()))?;
    }
    wtr.flush().with_context(|| format!("flush {}", path.display()))?;

    tracing::info!(path = %path.display(), pages = rows.len(), "Wrote page index");
    Ok(rows.len())
}

/// One page index line read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptLine {
    pub bates: String,
    pub volume: String,
    pub path: String,
    pub first_page: bool,
    pub page_count: Option<u32>,
}

/// Read a page index.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line does not have six fields.
pub fn read_opt(path: impl AsRef<Path>) -> Result<Vec<OptLine>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;

    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.is_empty())
        .map(|(idx, line)| {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 6 {
                bail!(ProductionError::Serialization(format!(
                    "{} line {}: expected 6 fields, found {}",
                    path.display(),
                    idx + 1,
                    fields.len()
                )));
            }
            Ok(OptLine {
                bates: fields[0].to_string(),
                volume: fields[1].to_string(),
                path: fields[2].to_string(),
                first_page: fields[3] == "Y",
                page_count: fields[5].parse().ok(),
            })
        })
        .collect()
}
