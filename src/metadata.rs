//! Metadata normalization onto the canonical production schema.
//!
//! Extraction collaborators hand back whatever keys their parser emits: `meta:author`
//! for a PDF, `From` for an email, `Slide Count` for a deck. This module maps those
//! format-specific keys onto one fixed set of [`SchemaField`]s through a static table
//! ([`field_source`]) and runs every date-valued field through a single parser
//! ([`parse_timestamp`]).
//!
//! Every schema field is present in a [`NormalizedMetadata`], mapped or not. A field
//! with no mapping for a format, or whose raw key is absent, holds `None`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A raw metadata value: extractors may report a key once or many times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Single(String),
    List(Vec<String>),
}

impl MetaValue {
    /// The single value, or the first element of a list.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s.as_str()),
            Self::List(v) => v.first().map(String::as_str),
        }
    }

    /// The value as display text; list elements are joined with `"; "`.
    pub fn to_text(&self) -> String {
        match self {
            Self::Single(s) => s.clone(),
            Self::List(v) => v.join("; "),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Key → value mapping as reported by an extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMetadata(BTreeMap<String, MetaValue>);

impl RawMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    /// First value for `key`, ignoring blank strings.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(MetaValue::first)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<MetaValue>> FromIterator<(K, V)> for RawMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Format tag derived from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatTag {
    Pdf,
    Word,
    Presentation,
    Spreadsheet,
    Msg,
    Eml,
    Pst,
    Tiff,
    Image,
    Text,
    Archive,
    Other,
}

impl FormatTag {
    /// Classify an extension, with or without the leading dot, case-insensitively.
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "doc" | "docx" => Self::Word,
            "ppt" | "pptx" => Self::Presentation,
            "xls" | "xlsx" => Self::Spreadsheet,
            "msg" => Self::Msg,
            "eml" => Self::Eml,
            "pst" => Self::Pst,
            "tif" | "tiff" => Self::Tiff,
            "jpg" | "jpeg" | "png" | "bmp" => Self::Image,
            "txt" | "rtf" => Self::Text,
            "zip" | "rar" | "7z" => Self::Archive,
            _ => Self::Other,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Self {
        path.extension()
            .map(|e| Self::from_extension(&e.to_string_lossy()))
            .unwrap_or(Self::Other)
    }

    pub fn is_email(self) -> bool {
        matches!(self, Self::Msg | Self::Eml | Self::Pst)
    }

    /// Formats the page expander renders page by page.
    pub fn is_paginated(self) -> bool {
        matches!(self, Self::Pdf | Self::Tiff)
    }
}

/// How a value is rendered once looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Time,
}

/// Canonical metadata fields filled from extractor output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchemaField {
    Subject,
    Title,
    Author,
    From,
    To,
    Cc,
    Bcc,
    DateSent,
    TimeSent,
    DateReceived,
    TimeReceived,
    DateCreated,
    TimeCreated,
    DateLastModified,
    TimeLastModified,
    MessageId,
    ThreadIndex,
    ForeignLanguage,
    PageCount,
    CharsPerPage,
    CharCount,
    Confidentiality,
    Privilege,
}

impl SchemaField {
    pub const ALL: [SchemaField; 23] = [
        Self::Subject,
        Self::Title,
        Self::Author,
        Self::From,
        Self::To,
        Self::Cc,
        Self::Bcc,
        Self::DateSent,
        Self::TimeSent,
        Self::DateReceived,
        Self::TimeReceived,
        Self::DateCreated,
        Self::TimeCreated,
        Self::DateLastModified,
        Self::TimeLastModified,
        Self::MessageId,
        Self::ThreadIndex,
        Self::ForeignLanguage,
        Self::PageCount,
        Self::CharsPerPage,
        Self::CharCount,
        Self::Confidentiality,
        Self::Privilege,
    ];

    pub fn kind(self) -> FieldKind {
        match self {
            Self::DateSent | Self::DateReceived | Self::DateCreated | Self::DateLastModified => {
                FieldKind::Date
            }
            Self::TimeSent | Self::TimeReceived | Self::TimeCreated | Self::TimeLastModified => {
                FieldKind::Time
            }
            _ => FieldKind::Text,
        }
    }
}

/// Where a schema field's value comes from for one format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// This raw key, for this format only.
    Key(&'static str),
    /// The same raw key regardless of format.
    AnyFormat(&'static str),
    /// No mapping; the field is always empty for this format.
    Unmapped,
}

impl FieldSource {
    pub fn raw_key(self) -> Option<&'static str> {
        match self {
            Self::Key(k) | Self::AnyFormat(k) => Some(k),
            Self::Unmapped => None,
        }
    }
}

/// The static field × format mapping table.
pub fn field_source(field: SchemaField, tag: FormatTag) -> FieldSource {
    use FieldSource::{AnyFormat, Key, Unmapped};
    use FormatTag::{Eml, Msg, Pdf, Presentation, Pst, Word};
    use SchemaField as F;

    match (field, tag) {
        (F::Title, Pdf | Word | Presentation) => Key("title"),
        (F::Title, Msg | Eml | Pst) => Key("Subject"),

        (F::Subject, Pdf | Word | Presentation | Msg | Eml | Pst) => Key("Subject"),

        (F::Author, Pdf) => Key("meta:author"),
        (F::Author, Word) => Key("author"),
        (F::Author, Presentation) => Key("dc:creator"),
        (F::Author, Msg | Eml | Pst) => Key("From"),

        (F::From, Msg | Eml | Pst) => Key("From"),
        (F::To, Msg | Eml | Pst) => Key("To"),
        (F::Cc, Msg | Eml | Pst) => Key("CC"),
        (F::Bcc, Msg | Eml | Pst) => Key("BCC"),

        (F::DateSent | F::TimeSent | F::DateReceived | F::TimeReceived, Msg | Eml | Pst) => {
            Key("Date")
        }

        (F::DateCreated | F::TimeCreated, Pdf | Word | Presentation) => Key("Creation-Date"),
        (F::DateCreated | F::TimeCreated, Msg | Eml | Pst) => Key("Date"),

        (F::DateLastModified | F::TimeLastModified, Pdf | Word | Presentation) => {
            Key("Last-Modified")
        }
        (F::DateLastModified | F::TimeLastModified, Msg | Eml | Pst) => Key("Date"),

        (F::MessageId, Msg | Eml | Pst) => Key("Message-ID"),
        (F::ThreadIndex, Msg | Eml | Pst) => Key("Thread-Index"),

        (F::PageCount, Pdf) => Key("xmpTPg:NPages"),
        (F::PageCount, Word) => Key("Page Count"),
        (F::PageCount, Presentation) => Key("Slide Count"),
        (F::CharsPerPage, Pdf) => Key("pdf:charsPerPage"),
        (F::CharCount, Word) => Key("Character Count"),

        (F::ForeignLanguage, _) => AnyFormat("Foreign Language"),
        (F::Confidentiality, _) => AnyFormat("Confidentiality"),
        (F::Privilege, _) => AnyFormat("Privilege"),

        _ => Unmapped,
    }
}

/// Normalized values for every [`SchemaField`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMetadata {
    values: BTreeMap<SchemaField, Option<String>>,
}

impl NormalizedMetadata {
    /// Metadata with every field present and empty.
    pub fn empty() -> Self {
        Self {
            values: SchemaField::ALL.iter().map(|&f| (f, None)).collect(),
        }
    }

    pub fn get(&self, field: SchemaField) -> Option<&str> {
        self.values.get(&field).and_then(|v| v.as_deref())
    }

    pub fn set(&mut self, field: SchemaField, value: Option<String>) {
        self.values.insert(field, value);
    }

    /// Whether `field` has an entry, empty or not.
    pub fn contains(&self, field: SchemaField) -> bool {
        self.values.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Map `raw` onto the canonical schema for a file of format `tag`.
pub fn normalize(tag: FormatTag, raw: &RawMetadata) -> NormalizedMetadata {
    let mut out = NormalizedMetadata::empty();
    // One parse per raw date key, shared by its date and time fields.
    let mut parsed: BTreeMap<&'static str, Option<DateTimeParts>> = BTreeMap::new();

    for field in SchemaField::ALL {
        let Some(key) = field_source(field, tag).raw_key() else {
            continue;
        };
        let Some(value) = raw.get(key) else {
            continue;
        };
        let rendered = match field.kind() {
            FieldKind::Text => Some(value.to_text()).filter(|s| !s.trim().is_empty()),
            FieldKind::Date => parsed
                .entry(key)
                .or_insert_with(|| parse_timestamp(value))
                .as_ref()
                .map(|p| p.date.clone()),
            FieldKind::Time => parsed
                .entry(key)
                .or_insert_with(|| parse_timestamp(value))
                .as_ref()
                .map(|p| p.time.clone()),
        };
        out.set(field, rendered);
    }
    out
}

/// A parsed timestamp rendered as loadfile date (`MM/DD/YYYY`) and time (`HH:MM:SS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeParts {
    pub date: String,
    pub time: String,
}

impl DateTimeParts {
    fn from_utc(dt: DateTime<Utc>) -> Self {
        Self {
            date: dt.format("%m/%d/%Y").to_string(),
            time: dt.format("%H:%M:%S").to_string(),
        }
    }
}

static FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(T\d{2}:\d{2}:\d{2})\.\d+").expect("valid fraction regex"));

static OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[+-]\d{2}:?\d{2}$").expect("valid offset regex"));

/// Parse an extractor timestamp.
///
/// Accepts a single string or the first element of a list. Fractional seconds are
/// dropped, a `Z` is appended when no zone is given, and the result is read as
/// ISO-8601. Email `Date` headers in RFC 2822 form are accepted as well. Anything else
/// yields `None` and a warning; this never fails.
pub fn parse_timestamp(value: &MetaValue) -> Option<DateTimeParts> {
    let raw = value.first()?.trim();
    if raw.is_empty() {
        return None;
    }

    let mut text = FRACTION.replace(raw, "$1").into_owned();
    if !text.ends_with(['Z', 'z']) && !OFFSET.is_match(&text) {
        text.push('Z');
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Some(DateTimeParts::from_utc(dt.with_timezone(&Utc)));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(DateTimeParts::from_utc(dt.with_timezone(&Utc)));
    }

    tracing::warn!(value = raw, "Could not parse timestamp");
    None
}
