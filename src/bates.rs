//! Bates number formatting and allocation.
//!
//! Numbers are allocated once, up front, from the sorted input list. Workers only ever
//! look their number up; nothing about completion order can move a file to a different
//! number. The allocated suffixes for N files are exactly `start..start + N`.
//!
//! ```
//! use ironbates::bates::{BatesAllocator, BatesFormat};
//! use std::path::PathBuf;
//!
//! let files = vec![PathBuf::from("in/b.pdf"), PathBuf::from("in/A.eml")];
//! let alloc = BatesAllocator::assign(BatesFormat::new("ABC", 6), 1000, files);
//! assert_eq!(alloc.lookup(&PathBuf::from("in/A.eml")).to_string(), "ABC001000");
//! assert_eq!(alloc.lookup(&PathBuf::from("in/b.pdf")).to_string(), "ABC001001");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::BatesConfig;

/// Prefix and zero-padding width shared by every number in a volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatesFormat {
    prefix: String,
    digits: usize,
}

impl BatesFormat {
    pub fn new(prefix: impl Into<String>, digits: usize) -> Self {
        Self {
            prefix: prefix.into(),
            digits,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn digits(&self) -> usize {
        self.digits
    }

    /// Build a number in this format.
    pub fn number(&self, value: u64) -> BatesNumber {
        BatesNumber {
            format: self.clone(),
            value,
        }
    }

    /// Parse a rendered number. The prefix must match exactly and the remainder must be
    /// all digits.
    pub fn parse(&self, text: &str) -> Option<BatesNumber> {
        let digits = text.strip_prefix(self.prefix.as_str())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(|value| self.number(value))
    }
}

impl From<&BatesConfig> for BatesFormat {
    fn from(config: &BatesConfig) -> Self {
        Self::new(config.prefix.clone(), config.digits)
    }
}

/// A prefix plus a zero-padded numeric suffix, e.g. `ABC001003`.
///
/// A value wider than the format's digit count renders unpadded rather than truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatesNumber {
    format: BatesFormat,
    value: u64,
}

impl BatesNumber {
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn format(&self) -> &BatesFormat {
        &self.format
    }

    /// The number `offset` places after this one, same prefix and width.
    #[must_use]
    pub fn offset(&self, offset: u64) -> Self {
        self.format.number(self.value + offset)
    }
}

impl fmt::Display for BatesNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            self.format.prefix,
            self.value,
            width = self.format.digits
        )
    }
}

impl PartialOrd for BatesNumber {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BatesNumber {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value
            .cmp(&other.value)
            .then_with(|| self.format.prefix.cmp(&other.format.prefix))
    }
}

/// Sort inputs into canonical production order: case-insensitive file name, then full
/// path to break ties between same-named files in different folders.
pub fn sort_inputs(files: &mut [PathBuf]) {
    files.sort_by(|a, b| {
        sort_key(a)
            .cmp(&sort_key(b))
            .then_with(|| a.cmp(b))
    });
}

fn sort_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Precomputed file → Bates number mapping.
#[derive(Debug)]
pub struct BatesAllocator {
    format: BatesFormat,
    start: u64,
    order: Vec<PathBuf>,
    assigned: HashMap<PathBuf, u64>,
    overflow: AtomicU64,
}

impl BatesAllocator {
    /// Assign `start, start + 1, …` to `files` after sorting them with [`sort_inputs`].
    pub fn assign(format: BatesFormat, start: u64, mut files: Vec<PathBuf>) -> Self {
        sort_inputs(&mut files);
        let assigned = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), start + i as u64))
            .collect();
        let next = start + files.len() as u64;
        Self {
            format,
            start,
            order: files,
            assigned,
            overflow: AtomicU64::new(next),
        }
    }

    pub fn format(&self) -> &BatesFormat {
        &self.format
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Files in allocation order.
    pub fn files(&self) -> &[PathBuf] {
        &self.order
    }

    /// Iterate `(file, number)` in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, BatesNumber)> + '_ {
        self.order
            .iter()
            .map(|f| (f.as_path(), self.format.number(self.assigned[f])))
    }

    /// The precomputed number for `file`, or `None` if it was not part of the input list.
    pub fn get(&self, file: &Path) -> Option<BatesNumber> {
        self.assigned.get(file).map(|&v| self.format.number(v))
    }

    /// The number for `file`.
    ///
    /// A file outside the precomputed list gets a fresh number past the end of the
    /// range. That should never happen in a run and is logged as an error.
    pub fn lookup(&self, file: &Path) -> BatesNumber {
        if let Some(number) = self.get(file) {
            return number;
        }
        let value = self.overflow.fetch_add(1, Ordering::SeqCst);
        let number = self.format.number(value);
        tracing::error!(
            file = %file.display(),
            bates = %number,
            "File missing from Bates pre-assignment, allocated past the end of the range"
        );
        number
    }

    /// Distance from `number` to the next file's base number, `None` for the last file
    /// or a number outside the allocated range.
    pub fn gap_after(&self, number: &BatesNumber) -> Option<u64> {
        let end = self.start + self.order.len() as u64;
        let v = number.value();
        if v < self.start || v + 1 >= end {
            None
        } else {
            Some(1)
        }
    }
}
