//! Delimited loadfile writer and reader.
//!
//! A loadfile is a header line followed by one line per record. Every value is wrapped
//! in the wrapper character (default `þ`, 0xFE) and fields are joined with the
//! delimiter (default 0x14). Empty values still get their wrapper pair. Lines end with
//! `\n`. There is no escaping: line breaks inside a value are written as the newline
//! replacement character (default `®`, 0xAE) and delimiter or wrapper characters inside
//! a value are dropped.
//!
//! Records are written in ascending BegBates order whatever order they were produced
//! in. With the `parallel-io` feature, lines are formatted on the rayon pool and
//! concatenated in order.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
#[cfg(feature = "parallel-io")]
use rayon::prelude::*;

use crate::config::{LoadfileConfig, TextEncoding};
use crate::error::ProductionError;
use crate::record::{LoadfileColumn, ProductionRecord};

/// Delimiter, wrapper, and encoding for one loadfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadfileOptions {
    pub delimiter: char,
    pub wrapper: char,
    /// Replaces `\r\n`, `\n`, and `\r` inside values.
    pub newline: char,
    pub encoding: TextEncoding,
}

impl Default for LoadfileOptions {
    fn default() -> Self {
        Self::from(&LoadfileConfig::default())
    }
}

impl From<&LoadfileConfig> for LoadfileOptions {
    fn from(config: &LoadfileConfig) -> Self {
        Self {
            delimiter: config.delimiter.as_char(),
            wrapper: config.wrapper.as_char(),
            newline: config.newline.as_char(),
            encoding: config.encoding,
        }
    }
}

impl LoadfileOptions {
    /// Wrap and join one line's values. No trailing newline.
    ///
    /// Line breaks inside a value become [`newline`](Self::newline) and delimiter or
    /// wrapper characters are dropped, so every line splits back into the same number
    /// of fields.
    pub fn format_line<'v>(&self, values: impl IntoIterator<Item = Option<&'v str>>) -> String {
        let mut line = String::new();
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                line.push(self.delimiter);
            }
            line.push(self.wrapper);
            line.push_str(&self.clean_value(value.unwrap_or_default()));
            line.push(self.wrapper);
        }
        line
    }

    /// `value` with line breaks replaced and delimiter and wrapper characters removed.
    pub fn clean_value<'v>(&self, value: &'v str) -> Cow<'v, str> {
        let special =
            |c: char| matches!(c, '\n' | '\r') || c == self.delimiter || c == self.wrapper;
        if !value.contains(special) {
            return Cow::Borrowed(value);
        }
        let mut out = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    chars.next_if_eq(&'\n');
                    out.push(self.newline);
                }
                '\n' => out.push(self.newline),
                c if c == self.delimiter || c == self.wrapper => {}
                c => out.push(c),
            }
        }
        Cow::Owned(out)
    }

    /// The header line. No trailing newline.
    pub fn header_line(&self) -> String {
        self.format_line(LoadfileColumn::ALL.iter().map(|c| Some(c.header())))
    }

    fn record_line(&self, record: &ProductionRecord) -> String {
        let row = record.row();
        self.format_line(row.iter().map(Option::as_deref))
    }

    /// Split one line back into unwrapped values.
    pub fn split_line(&self, line: &str) -> Vec<String> {
        line.split(self.delimiter)
            .map(|field| {
                let field = field.strip_prefix(self.wrapper).unwrap_or(field);
                field.strip_suffix(self.wrapper).unwrap_or(field).to_string()
            })
            .collect()
    }
}

/// Write `records` to `path` in ascending BegBates order. Returns the number of rows.
///
/// # Errors
///
/// Returns an error if a value cannot be represented in the configured encoding or the
/// file cannot be written. Nothing is written in the encoding case.
pub fn write_loadfile(
    path: impl AsRef<Path>,
    records: &[ProductionRecord],
    options: &LoadfileOptions,
) -> Result<usize> {
    let path = path.as_ref();

    let mut sorted: Vec<&ProductionRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.beg_bates.cmp(&b.beg_bates));

    let header = options
        .encoding
        .encode(&options.header_line())
        .context("encode loadfile header")?;
    let lines = encode_rows(&sorted, options)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(file);
    w.write_all(&header)?;
    w.write_all(b"\n")?;
    for line in &lines {
        w.write_all(line)?;
        w.write_all(b"\n")?;
    }
    w.flush().with_context(|| format!("flush {}", path.display()))?;

    tracing::info!(path = %path.display(), rows = sorted.len(), "Wrote loadfile");
    Ok(sorted.len())
}

#[cfg(feature = "parallel-io")]
fn encode_rows(records: &[&ProductionRecord], options: &LoadfileOptions) -> Result<Vec<Vec<u8>>> {
    records
        .par_iter()
        .map(|r| encode_row(r, options))
        .collect()
}

#[cfg(not(feature = "parallel-io"))]
fn encode_rows(records: &[&ProductionRecord], options: &LoadfileOptions) -> Result<Vec<Vec<u8>>> {
    records.iter().map(|r| encode_row(r, options)).collect()
}

fn encode_row(record: &ProductionRecord, options: &LoadfileOptions) -> Result<Vec<u8>> {
    options
        .encoding
        .encode(&options.record_line(record))
        .with_context(|| format!("encode loadfile row {}", record.beg_bates))
}

/// A loadfile read back into values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Loadfile {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Loadfile {
    /// Index of a header name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Values of one column, in row order.
    pub fn values(&self, column: LoadfileColumn) -> Vec<&str> {
        match self.column(column.header()) {
            Some(i) => self
                .rows
                .iter()
                .map(|r| r.get(i).map_or("", String::as_str))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Read a loadfile written with `options`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded, or has no header line.
pub fn read_loadfile(path: impl AsRef<Path>, options: &LoadfileOptions) -> Result<Loadfile> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let text = options
        .encoding
        .decode(&bytes)
        .with_context(|| format!("decode {}", path.display()))?;

    let mut lines = text.lines();
    let Some(header) = lines.next() else {
        bail!(ProductionError::Serialization(format!(
            "loadfile {} is empty",
            path.display()
        )));
    };
    Ok(Loadfile {
        header: options.split_line(header),
        rows: lines
            .filter(|l| !l.is_empty())
            .map(|l| options.split_line(l))
            .collect(),
    })
}
