//! Post-run integrity checks.
//!
//! [`IntegrityValidator`] re-reads the artifacts a run wrote and checks them, together
//! with the in-memory records, against the invariants a production must hold:
//!
//! | Check | Passes when |
//! |-------|-------------|
//! | `bates_unique` | no two records share a BegBates |
//! | `required_fields` | every record has BegBates, EndBates, HashValue, Filename, FileExtension, NativeLocation, TextLocation |
//! | `paths_exist` | every native and text location exists on disk |
//! | `loadfile_header` | the header uses the delimiter and wrapper and names the 40 columns in order |
//! | `family_consistency` | each family id has one key and each key one id |
//! | `date_format` | non-empty date fields look like `M/D/YYYY` |
//! | `bates_sequence` | BegBates suffixes are contiguous |
//! | `page_index` | every document's page count matches its page lines, and no page number lands on another document's BegBates |
//!
//! Checks never raise. An unreadable artifact fails its check with the read error as
//! the issue. Running the validator twice over the same volume yields the same report.
//!
//! Record-level rules are also available on their own through the [`Validate`] trait:
//!
//! ```no_run
//! use ironbates::validation::Validate;
//! # fn check(record: &ironbates::record::ProductionRecord) {
//! if let Err(errors) = record.validate() {
//!     for e in errors {
//!         eprintln!("{e}");
//!     }
//! }
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::io::layout::VolumeLayout;
use crate::io::loadfile::LoadfileOptions;
use crate::io::opt::{OptLine, read_opt};
use crate::record::{LoadfileColumn, ProductionRecord};

/// Result type for validation operations.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Types that can check themselves.
pub trait Validate {
    fn validate(&self) -> ValidationResult;
}

/// A single problem found by a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// The field or column involved, if any.
    pub field: Option<String>,
    pub message: String,
    /// BegBates or page number the problem concerns, if any.
    pub bates: Option<String>,
}

impl ValidationError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            field: None,
            message: message.into(),
            bates: None,
        }
    }

    pub fn field<S: Into<String>, M: Into<String>>(field: S, message: M) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
            bates: None,
        }
    }

    #[must_use]
    pub fn at<S: Into<String>>(mut self, bates: S) -> Self {
        self.bates = Some(bates.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref bates) = self.bates {
            write!(f, "{bates}: ")?;
        }
        if let Some(ref field) = self.field {
            write!(f, "[{field}] {}", self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("valid date regex"));

impl Validate for ProductionRecord {
    /// Required fields present and dates well-formed.
    fn validate(&self) -> ValidationResult {
        let mut errors = missing_required(self);
        errors.extend(malformed_dates(self));
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn missing_required(record: &ProductionRecord) -> Vec<ValidationError> {
    LoadfileColumn::ALL
        .iter()
        .filter(|c| c.is_required())
        .filter(|&&c| record.field(c).is_none_or(|v| v.trim().is_empty()))
        .map(|c| ValidationError::field(c.header(), "missing").at(record.beg_bates.to_string()))
        .collect()
}

fn malformed_dates(record: &ProductionRecord) -> Vec<ValidationError> {
    LoadfileColumn::ALL
        .iter()
        .filter(|c| c.is_date())
        .filter_map(|&c| record.field(c).map(|v| (c, v)))
        .filter(|(_, v)| !DATE.is_match(v))
        .map(|(c, v)| {
            ValidationError::field(c.header(), format!("malformed date {v:?}"))
                .at(record.beg_bates.to_string())
        })
        .collect()
}

/// The checks in the battery, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    BatesUnique,
    RequiredFields,
    PathsExist,
    LoadfileHeader,
    FamilyConsistency,
    DateFormat,
    BatesSequence,
    PageIndex,
}

impl Check {
    pub const ALL: [Check; 8] = [
        Self::BatesUnique,
        Self::RequiredFields,
        Self::PathsExist,
        Self::LoadfileHeader,
        Self::FamilyConsistency,
        Self::DateFormat,
        Self::BatesSequence,
        Self::PageIndex,
    ];
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub check: Check,
    pub passed: bool,
    pub issues: Vec<ValidationError>,
}

impl CheckOutcome {
    fn from_issues(check: Check, issues: Vec<ValidationError>) -> Self {
        Self {
            check,
            passed: issues.is_empty(),
            issues,
        }
    }
}

/// Outcomes of the whole battery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub checks: Vec<CheckOutcome>,
}

impl IntegrityReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn outcome(&self, check: Check) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.check == check)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckOutcome> + '_ {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Write the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
    }
}

/// Runs the integrity battery over one volume.
#[derive(Debug, Clone)]
pub struct IntegrityValidator<'a> {
    layout: &'a VolumeLayout,
    options: LoadfileOptions,
}

impl<'a> IntegrityValidator<'a> {
    pub fn new(layout: &'a VolumeLayout, options: LoadfileOptions) -> Self {
        Self { layout, options }
    }

    /// Run every check against `records` and the volume's artifacts.
    pub fn validate(&self, records: &[ProductionRecord]) -> IntegrityReport {
        let mut sorted: Vec<&ProductionRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.beg_bates.cmp(&b.beg_bates));

        let checks = Check::ALL
            .iter()
            .map(|&check| {
                let issues = match check {
                    Check::BatesUnique => bates_unique(&sorted),
                    Check::RequiredFields => required_fields(&sorted),
                    Check::PathsExist => self.paths_exist(&sorted),
                    Check::LoadfileHeader => self.loadfile_header(),
                    Check::FamilyConsistency => family_consistency(&sorted),
                    Check::DateFormat => date_format(&sorted),
                    Check::BatesSequence => bates_sequence(&sorted),
                    Check::PageIndex => self.page_index(&sorted),
                };
                let outcome = CheckOutcome::from_issues(check, issues);
                if outcome.passed {
                    tracing::debug!(check = ?check, "Integrity check passed");
                } else {
                    tracing::warn!(
                        check = ?check,
                        issues = outcome.issues.len(),
                        "Integrity check failed"
                    );
                }
                outcome
            })
            .collect();

        IntegrityReport { checks }
    }

    fn paths_exist(&self, records: &[&ProductionRecord]) -> Vec<ValidationError> {
        let mut issues = Vec::new();
        for r in records {
            for (column, location) in [
                (LoadfileColumn::NativeLocation, &r.native_location),
                (LoadfileColumn::TextLocation, &r.text_location),
            ] {
                if !self.layout.resolve(location).is_file() {
                    issues.push(
                        ValidationError::field(column.header(), format!("{location} not found"))
                            .at(r.beg_bates.to_string()),
                    );
                }
            }
        }
        issues
    }

    fn loadfile_header(&self) -> Vec<ValidationError> {
        let path = self.layout.loadfile_path();
        let header = match read_header(&path, &self.options) {
            Ok(h) => h,
            Err(e) => return vec![ValidationError::new(format!("{e:#}"))],
        };

        let mut issues = Vec::new();
        if !header.contains(self.options.delimiter) {
            issues.push(ValidationError::new("header does not contain the delimiter"));
        }
        if !header.contains(self.options.wrapper) {
            issues.push(ValidationError::new("header does not contain the wrapper"));
        }
        let names = self.options.split_line(&header);
        if names.len() != LoadfileColumn::ALL.len() {
            issues.push(ValidationError::new(format!(
                "header has {} columns, expected {}",
                names.len(),
                LoadfileColumn::ALL.len()
            )));
            return issues;
        }
        for (got, column) in names.iter().zip(LoadfileColumn::ALL) {
            if got != column.header() {
                issues.push(ValidationError::field(
                    column.header(),
                    format!("header column out of order, found {got:?}"),
                ));
                break;
            }
        }
        issues
    }

    fn page_index(&self, records: &[&ProductionRecord]) -> Vec<ValidationError> {
        let path = self.layout.opt_path();
        if !path.exists() {
            return vec![ValidationError::new(format!("{} not found", path.display()))];
        }
        let lines = match read_opt(&path) {
            Ok(lines) => lines,
            Err(e) => return vec![ValidationError::new(format!("{e:#}"))],
        };
        page_index_issues(&lines, records)
    }
}

fn read_header(path: &Path, options: &LoadfileOptions) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
    let header = options
        .encoding
        .decode(&bytes[..end])
        .with_context(|| format!("decode header of {}", path.display()))?;
    Ok(header)
}

fn bates_unique(records: &[&ProductionRecord]) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| !seen.insert(r.beg_bates.to_string()))
        .map(|r| {
            ValidationError::field("BegBates", format!("duplicate, also on {}", r.file_name))
                .at(r.beg_bates.to_string())
        })
        .collect()
}

fn required_fields(records: &[&ProductionRecord]) -> Vec<ValidationError> {
    records.iter().flat_map(|r| missing_required(r)).collect()
}

fn date_format(records: &[&ProductionRecord]) -> Vec<ValidationError> {
    records.iter().flat_map(|r| malformed_dates(r)).collect()
}

fn family_consistency(records: &[&ProductionRecord]) -> Vec<ValidationError> {
    let mut keys_by_id: BTreeMap<u64, BTreeSet<&str>> = BTreeMap::new();
    let mut ids_by_key: BTreeMap<&str, BTreeSet<u64>> = BTreeMap::new();
    for family in records.iter().filter_map(|r| r.family.as_ref()) {
        keys_by_id.entry(family.id).or_default().insert(&family.key);
        ids_by_key.entry(&family.key).or_default().insert(family.id);
    }

    let mut issues = Vec::new();
    for (id, keys) in keys_by_id.iter().filter(|(_, k)| k.len() > 1) {
        issues.push(ValidationError::field(
            "FamilyID",
            format!("family {id} has {} keys: {keys:?}", keys.len()),
        ));
    }
    for (key, ids) in ids_by_key.iter().filter(|(_, i)| i.len() > 1) {
        issues.push(ValidationError::field(
            "FamilyID",
            format!("family key {key} has {} ids: {ids:?}", ids.len()),
        ));
    }
    issues
}

fn bates_sequence(records: &[&ProductionRecord]) -> Vec<ValidationError> {
    records
        .windows(2)
        .filter(|w| w[1].beg_bates.value() > w[0].beg_bates.value() + 1)
        .map(|w| {
            let missing = w[1].beg_bates.value() - w[0].beg_bates.value() - 1;
            ValidationError::field(
                "BegBates",
                format!("{missing} number(s) missing before {}", w[1].beg_bates),
            )
            .at(w[0].beg_bates.to_string())
        })
        .collect()
}

fn page_index_issues(lines: &[OptLine], records: &[&ProductionRecord]) -> Vec<ValidationError> {
    let mut issues = Vec::new();

    // Group lines into documents at each first-page flag.
    let mut groups: Vec<(&OptLine, usize)> = Vec::new();
    for line in lines {
        if line.first_page {
            groups.push((line, 1));
        } else if let Some((_, n)) = groups.last_mut() {
            *n += 1;
        } else {
            issues.push(
                ValidationError::new("page line before any first page").at(line.bates.clone()),
            );
        }
    }
    for (first, n) in groups {
        match first.page_count {
            Some(count) if count as usize == n => {}
            Some(count) => issues.push(
                ValidationError::field(
                    "page_count",
                    format!("declares {count} pages, index has {n}"),
                )
                .at(first.bates.clone()),
            ),
            None => issues.push(
                ValidationError::field("page_count", "first page has no page count")
                    .at(first.bates.clone()),
            ),
        }
    }

    let mut seen = HashSet::new();
    for line in lines.iter().filter(|l| !seen.insert(l.bates.as_str())) {
        issues.push(ValidationError::new("page number listed twice").at(line.bates.clone()));
    }

    let starts: BTreeMap<String, &str> = records
        .iter()
        .map(|r| (r.beg_bates.to_string(), r.file_name.as_str()))
        .collect();
    for line in lines.iter().filter(|l| !l.first_page) {
        if let Some(other) = starts.get(&line.bates) {
            issues.push(
                ValidationError::new(format!("page number collides with BegBates of {other}"))
                    .at(line.bates.clone()),
            );
        }
    }

    issues
}
