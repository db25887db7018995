//! Assertions over produced records and artifacts.

use std::collections::BTreeSet;

use crate::record::{LoadfileColumn, ProductionRecord};

/// Assert BegBates suffixes are exactly `start..start + n` for `n` records.
///
/// # Panics
///
/// Panics with the actual suffixes if they differ.
pub fn assert_gapless(records: &[ProductionRecord], start: u64) {
    let actual: Vec<u64> = records
        .iter()
        .map(|r| r.beg_bates.value())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let expected: Vec<u64> = (start..start + records.len() as u64).collect();
    assert_eq!(
        actual, expected,
        "Bates suffixes are not the contiguous range starting at {start}"
    );
}

/// Assert every required loadfile column is non-empty on every record.
///
/// # Panics
///
/// Panics naming the first record and column found empty.
pub fn assert_required_fields(records: &[ProductionRecord]) {
    for record in records {
        for column in LoadfileColumn::ALL.into_iter().filter(|c| c.is_required()) {
            assert!(
                record.field(column).is_some_and(|v| !v.trim().is_empty()),
                "{} has empty {}",
                record.beg_bates,
                column
            );
        }
    }
}

/// `(BegBates, Filename)` pairs in BegBates order.
#[must_use]
pub fn bates_map(records: &[ProductionRecord]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = records
        .iter()
        .map(|r| (r.beg_bates.to_string(), r.file_name.clone()))
        .collect();
    out.sort();
    out
}
