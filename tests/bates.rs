//! Tests for Bates formatting and allocation.

use std::path::{Path, PathBuf};

use ironbates::bates::{BatesAllocator, BatesFormat, sort_inputs};

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

#[test]
fn test_allocation_follows_case_insensitive_name_order() {
    let files = paths(&["in/c.txt", "in/B.pdf", "in/a.eml"]);
    let alloc = BatesAllocator::assign(BatesFormat::new("ABC", 6), 1000, files);

    let assigned: Vec<(String, String)> = alloc
        .iter()
        .map(|(f, n)| (f.display().to_string(), n.to_string()))
        .collect();
    assert_eq!(
        assigned,
        vec![
            ("in/a.eml".to_string(), "ABC001000".to_string()),
            ("in/B.pdf".to_string(), "ABC001001".to_string()),
            ("in/c.txt".to_string(), "ABC001002".to_string()),
        ]
    );
}

#[test]
fn test_allocated_range_is_contiguous() {
    let files: Vec<PathBuf> = (0..50).map(|i| PathBuf::from(format!("doc{i:03}.txt"))).collect();
    let alloc = BatesAllocator::assign(BatesFormat::new("X", 4), 7, files);

    let mut values: Vec<u64> = alloc.iter().map(|(_, n)| n.value()).collect();
    values.sort_unstable();
    assert_eq!(values, (7..57).collect::<Vec<_>>());
    assert_eq!(alloc.len(), 50);
    assert_eq!(alloc.start(), 7);
}

#[test]
fn test_same_name_in_different_folders_breaks_tie_by_path() {
    let mut files = paths(&["z/report.pdf", "a/report.pdf", "m/Report.pdf"]);
    sort_inputs(&mut files);
    assert_eq!(files, paths(&["a/report.pdf", "m/Report.pdf", "z/report.pdf"]));
}

#[test]
fn test_padding_and_wide_values() {
    let format = BatesFormat::new("ABC", 6);
    assert_eq!(format.number(42).to_string(), "ABC000042");
    assert_eq!(format.number(1_234_567).to_string(), "ABC1234567");
    assert_eq!(format.number(1000).offset(2).to_string(), "ABC001002");
}

#[test]
fn test_parse_round_trip_and_rejects() {
    let format = BatesFormat::new("ABC", 6);
    assert_eq!(format.parse("ABC001000").map(|n| n.value()), Some(1000));
    assert!(format.parse("XYZ001000").is_none());
    assert!(format.parse("ABC").is_none());
    assert!(format.parse("ABC00x100").is_none());
}

#[test]
fn test_lookup_is_stable_and_unknown_files_go_past_the_end() {
    let alloc = BatesAllocator::assign(BatesFormat::new("P", 3), 1, paths(&["a", "b"]));

    assert_eq!(alloc.lookup(Path::new("b")).value(), 2);
    assert_eq!(alloc.lookup(Path::new("b")).value(), 2);
    assert!(alloc.get(Path::new("stray")).is_none());
    assert_eq!(alloc.lookup(Path::new("stray")).value(), 3);
    assert_eq!(alloc.lookup(Path::new("other")).value(), 4);
}

#[test]
fn test_gap_after_is_none_for_last_file() {
    let alloc = BatesAllocator::assign(BatesFormat::new("P", 3), 10, paths(&["a", "b", "c"]));
    let format = alloc.format().clone();

    assert_eq!(alloc.gap_after(&format.number(10)), Some(1));
    assert_eq!(alloc.gap_after(&format.number(11)), Some(1));
    assert_eq!(alloc.gap_after(&format.number(12)), None);
    assert_eq!(alloc.gap_after(&format.number(9)), None);
}

#[test]
fn test_empty_allocation() {
    let alloc = BatesAllocator::assign(BatesFormat::new("P", 3), 10, Vec::new());
    assert!(alloc.is_empty());
    assert_eq!(alloc.files().len(), 0);
}
