//! Production records: one per input file, one row in the loadfile.
//!
//! [`ProductionRecordBuilder`] assembles a record from the pieces a worker has gathered
//! for one file (Bates number, extractor output, family, page count), stores the native
//! and text copies under the volume, and hashes the original. Every one of the 40
//! [`LoadfileColumn`]s is answerable through [`ProductionRecord::field`], empty or not.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bates::BatesNumber;
use crate::collaborators::ExtractedDocument;
use crate::family::{FamilyAssignment, file_name};
use crate::io::layout::VolumeLayout;
use crate::metadata::{FormatTag, NormalizedMetadata, SchemaField, normalize};

/// Placeholder written to the text file when extraction found no text.
pub const NO_TEXT: &str = "NO TEXT AVAILABLE\n";

/// Loadfile columns, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoadfileColumn {
    BegBates,
    EndBates,
    HashValue,
    FileExtension,
    Filename,
    NativeLocation,
    TextLocation,
    BegAttach,
    EndAttach,
    Custodian,
    DuplicateCustodian,
    OriginalFilePath,
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
    RedactionType,
    DocType,
    FamilyId,
    ParentId,
    ProductionVolume,
}

impl LoadfileColumn {
    pub const ALL: [LoadfileColumn; 40] = [
        Self::BegBates,
        Self::EndBates,
        Self::HashValue,
        Self::FileExtension,
        Self::Filename,
        Self::NativeLocation,
        Self::TextLocation,
        Self::BegAttach,
        Self::EndAttach,
        Self::Custodian,
        Self::DuplicateCustodian,
        Self::OriginalFilePath,
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
        Self::RedactionType,
        Self::DocType,
        Self::FamilyId,
        Self::ParentId,
        Self::ProductionVolume,
    ];

    /// Header text as it appears in the loadfile.
    pub fn header(self) -> &'static str {
        match self {
            Self::BegBates => "BegBates",
            Self::EndBates => "EndBates",
            Self::HashValue => "HashValue",
            Self::FileExtension => "FileExtension",
            Self::Filename => "Filename",
            Self::NativeLocation => "NativeLocation",
            Self::TextLocation => "TextLocation",
            Self::BegAttach => "BegAttach",
            Self::EndAttach => "EndAttach",
            Self::Custodian => "Custodian",
            Self::DuplicateCustodian => "Duplicate Custodian",
            Self::OriginalFilePath => "Original FilePath",
            Self::Subject => "Subject",
            Self::Title => "Title",
            Self::Author => "Author",
            Self::From => "From",
            Self::To => "To",
            Self::Cc => "CC",
            Self::Bcc => "BCC",
            Self::DateSent => "DateSent",
            Self::TimeSent => "TimeSent",
            Self::DateReceived => "DateReceived",
            Self::TimeReceived => "TimeReceived",
            Self::DateCreated => "DateCreated",
            Self::TimeCreated => "TimeCreated",
            Self::DateLastModified => "DateLastModified",
            Self::TimeLastModified => "TimeLastModified",
            Self::MessageId => "Message-ID",
            Self::ThreadIndex => "Thread-Index",
            Self::ForeignLanguage => "Foreign Language",
            Self::PageCount => "Page Count",
            Self::CharsPerPage => "charsperpage",
            Self::CharCount => "charcount",
            Self::Confidentiality => "Confidentiality",
            Self::Privilege => "Privilege",
            Self::RedactionType => "RedactionType",
            Self::DocType => "DocType",
            Self::FamilyId => "FamilyID",
            Self::ParentId => "ParentID",
            Self::ProductionVolume => "Production Volume",
        }
    }

    /// The metadata field backing this column, for columns filled by normalization.
    pub fn schema_field(self) -> Option<SchemaField> {
        use SchemaField as F;
        Some(match self {
            Self::Subject => F::Subject,
            Self::Title => F::Title,
            Self::Author => F::Author,
            Self::From => F::From,
            Self::To => F::To,
            Self::Cc => F::Cc,
            Self::Bcc => F::Bcc,
            Self::DateSent => F::DateSent,
            Self::TimeSent => F::TimeSent,
            Self::DateReceived => F::DateReceived,
            Self::TimeReceived => F::TimeReceived,
            Self::DateCreated => F::DateCreated,
            Self::TimeCreated => F::TimeCreated,
            Self::DateLastModified => F::DateLastModified,
            Self::TimeLastModified => F::TimeLastModified,
            Self::MessageId => F::MessageId,
            Self::ThreadIndex => F::ThreadIndex,
            Self::ForeignLanguage => F::ForeignLanguage,
            Self::PageCount => F::PageCount,
            Self::CharsPerPage => F::CharsPerPage,
            Self::CharCount => F::CharCount,
            Self::Confidentiality => F::Confidentiality,
            Self::Privilege => F::Privilege,
            _ => return None,
        })
    }

    /// Columns that must be non-empty on every record.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Self::BegBates
                | Self::EndBates
                | Self::HashValue
                | Self::Filename
                | Self::FileExtension
                | Self::NativeLocation
                | Self::TextLocation
        )
    }

    pub fn is_date(self) -> bool {
        matches!(
            self,
            Self::DateSent | Self::DateReceived | Self::DateCreated | Self::DateLastModified
        )
    }
}

impl fmt::Display for LoadfileColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Document type classification by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocType {
    Email,
    WordDocument,
    Spreadsheet,
    Presentation,
    PdfDocument,
    Image,
    TextDocument,
    Archive,
    Unknown,
}

impl DocType {
    pub fn from_extension(ext: &str) -> Self {
        match FormatTag::from_extension(ext) {
            FormatTag::Msg | FormatTag::Eml | FormatTag::Pst => Self::Email,
            FormatTag::Word => Self::WordDocument,
            FormatTag::Spreadsheet => Self::Spreadsheet,
            FormatTag::Presentation => Self::Presentation,
            FormatTag::Pdf => Self::PdfDocument,
            FormatTag::Tiff | FormatTag::Image => Self::Image,
            FormatTag::Text => Self::TextDocument,
            FormatTag::Archive => Self::Archive,
            FormatTag::Other => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::WordDocument => "Word Document",
            Self::Spreadsheet => "Spreadsheet",
            Self::Presentation => "Presentation",
            Self::PdfDocument => "PDF Document",
            Self::Image => "Image",
            Self::TextDocument => "Text Document",
            Self::Archive => "Archive",
            Self::Unknown => "Unknown",
        }
    }
}

/// Redaction classification from the file name and extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RedactionType {
    Redacted,
    Privileged,
    Confidential,
    None,
}

impl RedactionType {
    /// File-name tokens win over content markers; the first matching token wins.
    pub fn classify(file_name: &str, content: Option<&str>) -> Self {
        let name = file_name.to_lowercase();
        if name.contains("redacted") {
            Self::Redacted
        } else if name.contains("privileged") {
            Self::Privileged
        } else if name.contains("confidential") {
            Self::Confidential
        } else if content.is_some_and(|c| c.contains("[REDACTED]") || c.contains("***")) {
            Self::Redacted
        } else {
            Self::None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Redacted => "Redacted",
            Self::Privileged => "Privileged",
            Self::Confidential => "Confidential",
            Self::None => "None",
        }
    }
}

/// The canonical record for one produced file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub beg_bates: BatesNumber,
    pub end_bates: BatesNumber,
    pub hash: String,
    pub extension: String,
    pub file_name: String,
    pub native_location: String,
    pub text_location: String,
    pub beg_attach: Option<String>,
    pub end_attach: Option<String>,
    pub custodian: String,
    pub original_path: String,
    pub metadata: NormalizedMetadata,
    pub redaction: RedactionType,
    pub doc_type: DocType,
    pub family: Option<FamilyAssignment>,
    pub parent_id: Option<String>,
    pub volume: String,
}

impl ProductionRecord {
    /// Value for one loadfile column. `None` serializes as an empty field.
    pub fn field(&self, column: LoadfileColumn) -> Option<String> {
        use LoadfileColumn as C;

        if let Some(field) = column.schema_field() {
            return self.metadata.get(field).map(str::to_string);
        }
        let text = match column {
            C::BegBates => self.beg_bates.to_string(),
            C::EndBates => self.end_bates.to_string(),
            C::HashValue => self.hash.clone(),
            C::FileExtension => self.extension.clone(),
            C::Filename => self.file_name.clone(),
            C::NativeLocation => self.native_location.clone(),
            C::TextLocation => self.text_location.clone(),
            C::BegAttach => return self.beg_attach.clone(),
            C::EndAttach => return self.end_attach.clone(),
            C::Custodian => self.custodian.clone(),
            C::OriginalFilePath => self.original_path.clone(),
            C::RedactionType => self.redaction.label().to_string(),
            C::DocType => self.doc_type.label().to_string(),
            C::FamilyId => return self.family.as_ref().map(|f| f.id.to_string()),
            C::ParentId => return self.parent_id.clone(),
            C::ProductionVolume => self.volume.clone(),
            _ => return None,
        };
        Some(text).filter(|s| !s.is_empty())
    }

    /// All 40 values in column order.
    pub fn row(&self) -> Vec<Option<String>> {
        LoadfileColumn::ALL.iter().map(|&c| self.field(c)).collect()
    }

    /// Raise EndBates. Never lowers it.
    pub fn set_end_bates(&mut self, end: BatesNumber) {
        if end > self.end_bates {
            self.end_bates = end;
        }
    }

    /// Fill `Page Count` from the rendered page count when extraction left it empty.
    pub fn fill_page_count(&mut self, pages: u32) {
        if pages > 0 && self.metadata.get(SchemaField::PageCount).is_none() {
            self.metadata.set(SchemaField::PageCount, Some(pages.to_string()));
        }
    }

    pub fn family_id(&self) -> Option<u64> {
        self.family.as_ref().map(|f| f.id)
    }
}

/// Everything gathered for one file before its record is built.
#[derive(Debug)]
pub struct RecordInput<'a> {
    pub path: &'a Path,
    pub bates: BatesNumber,
    pub extracted: &'a ExtractedDocument,
    pub family: Option<FamilyAssignment>,
    /// Pages rendered by the page expander, if the file was expanded.
    pub page_count: Option<u32>,
}

/// Builds records and stores the per-file artifacts for one volume.
#[derive(Debug, Clone)]
pub struct ProductionRecordBuilder<'a> {
    layout: &'a VolumeLayout,
    custodian: &'a str,
    input_root: Option<&'a Path>,
}

impl<'a> ProductionRecordBuilder<'a> {
    pub fn new(layout: &'a VolumeLayout, custodian: &'a str) -> Self {
        Self {
            layout,
            custodian,
            input_root: None,
        }
    }

    /// Record `Original FilePath` relative to `root`.
    #[must_use]
    pub fn with_input_root(mut self, root: &'a Path) -> Self {
        self.input_root = Some(root);
        self
    }

    /// Hash the file, copy its native and text into the volume, and assemble the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the copies cannot be written.
    pub fn build(&self, input: RecordInput<'_>) -> Result<ProductionRecord> {
        let RecordInput {
            path,
            bates,
            extracted,
            family,
            page_count,
        } = input;

        let name = file_name(path);
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tag = FormatTag::from_extension(&extension);
        let doc_type = DocType::from_extension(&extension);
        let content = extracted.content.as_deref();

        let mut metadata = normalize(tag, &extracted.metadata);
        let lower = name.to_lowercase();
        if metadata.get(SchemaField::Confidentiality).is_none() && lower.contains("confidential") {
            metadata.set(SchemaField::Confidentiality, Some("Confidential".to_string()));
        }
        if metadata.get(SchemaField::Privilege).is_none() && lower.contains("privileged") {
            metadata.set(SchemaField::Privilege, Some("Privileged".to_string()));
        }

        let hash = hash_file(path)?;
        let native_location = store_native(self.layout, path, &bates, &extension)?;
        let text_location = store_text(self.layout, &bates, content)?;

        let mut record = ProductionRecord {
            end_bates: bates.clone(),
            beg_bates: bates,
            hash,
            extension,
            file_name: name.clone(),
            native_location,
            text_location,
            beg_attach: None,
            end_attach: None,
            custodian: self.custodian.to_string(),
            original_path: self.original_path(path),
            metadata,
            redaction: RedactionType::classify(&name, content),
            doc_type,
            family,
            parent_id: None,
            volume: self.layout.volume().to_string(),
        };
        if let Some(pages) = page_count {
            record.fill_page_count(pages);
        }
        Ok(record)
    }

    fn original_path(&self, path: &Path) -> String {
        let rel = self
            .input_root
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }
}

/// SHA-256 of the file's bytes, lowercase hex.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).with_context(|| format!("hash {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Copy the original into the volume; returns its relative location.
///
/// # Errors
///
/// Returns an error if the copy fails.
pub fn store_native(
    layout: &VolumeLayout,
    path: &Path,
    bates: &BatesNumber,
    extension: &str,
) -> Result<String> {
    let location = layout.native_location(bates, extension);
    let target = layout.resolve(&location);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    std::fs::copy(path, &target)
        .with_context(|| format!("copy {} to {}", path.display(), target.display()))?;
    Ok(location)
}

/// Write extracted text, or the placeholder, into the volume; returns its relative
/// location. Leading and trailing newlines are dropped.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn store_text(
    layout: &VolumeLayout,
    bates: &BatesNumber,
    content: Option<&str>,
) -> Result<String> {
    let location = layout.text_location(bates);
    let target = layout.resolve(&location);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let text = content.map_or(NO_TEXT, |c| c.trim_matches(['\n', '\r']));
    std::fs::write(&target, text).with_context(|| format!("write {}", target.display()))?;
    Ok(location)
}

/// Fill the attachment range and parent id across each family.
///
/// Within a family of two or more records, BegAttach and EndAttach span the first
/// BegBates to the last EndBates, and every member after the first gets the first
/// member's BegBates as its ParentID. Expects `records` in BegBates order.
pub fn link_families(records: &mut [ProductionRecord]) {
    let mut ranges: BTreeMap<u64, (BatesNumber, BatesNumber, usize)> = BTreeMap::new();
    for record in records.iter() {
        let Some(id) = record.family_id() else {
            continue;
        };
        ranges
            .entry(id)
            .and_modify(|(_, end, n)| {
                if record.end_bates > *end {
                    *end = record.end_bates.clone();
                }
                *n += 1;
            })
            .or_insert_with(|| (record.beg_bates.clone(), record.end_bates.clone(), 1));
    }

    for record in records.iter_mut() {
        let Some((first, last, members)) = record.family_id().and_then(|id| ranges.get(&id))
        else {
            continue;
        };
        if *members < 2 {
            continue;
        }
        record.beg_attach = Some(first.to_string());
        record.end_attach = Some(last.to_string());
        if record.beg_bates != *first {
            record.parent_id = Some(first.to_string());
        }
    }
}
