//! Production configuration.
//!
//! A [`ProductionConfig`] carries everything a run consumes: Bates numbering, loadfile
//! delimiters and encoding, worker and timeout limits, page rendering, and stamping
//! placement. Every section has sensible defaults and can be loaded from a JSON file
//! whose layout mirrors the sections below:
//!
//! ```json
//! {
//!   "volume_name": "PROD_VOL001",
//!   "bates": { "prefix": "ABC", "start": 1000, "digits": 6 },
//!   "loadfile": { "delimiter": "0x14", "wrapper": "0xFE", "encoding": "utf-8" },
//!   "processing": { "max_workers": 4, "pdf_chunk_size": 5, "pdf_dpi": 150 }
//! }
//! ```
//!
//! Missing keys take their defaults. [`ProductionConfig::validate`] is called by the
//! runner before any task is scheduled, so a bad delimiter or an empty volume name
//! fails fast.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ProductionError;

/// Top-level configuration for one production volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Name of the production volume; also the output subdirectory name.
    pub volume_name: String,
    /// Custodian written to every record.
    pub custodian: String,
    pub bates: BatesConfig,
    pub loadfile: LoadfileConfig,
    pub processing: ProcessingConfig,
    pub stamping: StampConfig,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        Self {
            volume_name: "PROD_VOL001".to_string(),
            custodian: String::new(),
            bates: BatesConfig::default(),
            loadfile: LoadfileConfig::default(),
            processing: ProcessingConfig::default(),
            stamping: StampConfig::default(),
        }
    }
}

impl ProductionConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file is not an error: defaults are returned and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Configuration file not found, using defaults"
            );
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value has the wrong shape.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        Ok(config)
    }

    /// Write this configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write config {}", path.display()))
    }

    /// Check the configuration for values that would make a run meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ProductionError> {
        let fail = |msg: String| Err(ProductionError::Config(msg));

        let volume = self.volume_name.trim();
        if volume.is_empty() {
            return fail("volume name must not be empty".into());
        }
        if volume.contains(['/', '\\', ',']) {
            return fail(format!(
                "volume name {volume:?} must not contain path separators or commas"
            ));
        }
        if self.bates.prefix.contains(',') {
            return fail(format!("Bates prefix {:?} must not contain commas", self.bates.prefix));
        }
        if !(1..=20).contains(&self.bates.digits) {
            return fail(format!("Bates digit width {} must be 1..=20", self.bates.digits));
        }
        if self.loadfile.delimiter == self.loadfile.wrapper {
            return fail(format!(
                "loadfile delimiter and wrapper must differ (both {})",
                self.loadfile.delimiter
            ));
        }
        let LoadfileConfig {
            delimiter,
            wrapper,
            newline,
            ..
        } = self.loadfile;
        if newline == delimiter || newline == wrapper || matches!(newline.0, b'\n' | b'\r') {
            return fail(format!(
                "loadfile newline replacement {newline} must not be the delimiter, the wrapper, \
                 or a line break"
            ));
        }
        if self.processing.pdf_chunk_size == 0 {
            return fail("pdf_chunk_size must be at least 1".into());
        }
        if self.processing.pdf_dpi == 0 {
            return fail("pdf_dpi must be positive".into());
        }
        if let FamilyKeyMode::Token { keyspace: 0 } = self.processing.family_key_mode {
            return fail("family token keyspace must be positive".into());
        }
        Ok(())
    }
}

/// Bates numbering: `<prefix><zero-padded number>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatesConfig {
    pub prefix: String,
    pub start: u64,
    pub digits: usize,
}

impl Default for BatesConfig {
    fn default() -> Self {
        Self {
            prefix: "PROD".to_string(),
            start: 1,
            digits: 8,
        }
    }
}

/// Loadfile delimiters and encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadfileConfig {
    pub delimiter: HexByte,
    pub wrapper: HexByte,
    /// Written in place of line breaks inside a value (`®` by default).
    pub newline: HexByte,
    pub encoding: TextEncoding,
}

impl Default for LoadfileConfig {
    fn default() -> Self {
        Self {
            delimiter: HexByte(0x14),
            wrapper: HexByte(0xFE),
            newline: HexByte(0xAE),
            encoding: TextEncoding::Utf8,
        }
    }
}

/// A single byte given as a hex string such as `"0x14"`.
///
/// The byte is interpreted as a Unicode code point, so `0xFE` is `þ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexByte(pub u8);

impl HexByte {
    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

impl TryFrom<String> for HexByte {
    type Error = ProductionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for HexByte {
    type Err = ProductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u8::from_str_radix(digits, 16)
            .map(HexByte)
            .map_err(|_| ProductionError::Config(format!("invalid hex byte {s:?}")))
    }
}

impl From<HexByte> for String {
    fn from(value: HexByte) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HexByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Text encoding for the loadfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
        }
    }

    /// Encode a line of text.
    ///
    /// # Errors
    ///
    /// Returns [`ProductionError::Encoding`] for a character outside the target
    /// character set.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, ProductionError> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 => text
                .chars()
                .map(|ch| {
                    u8::try_from(u32::from(ch)).map_err(|_| ProductionError::Encoding {
                        ch,
                        encoding: self.label(),
                    })
                })
                .collect(),
        }
    }

    /// Decode bytes written by [`TextEncoding::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Result<String, ProductionError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| ProductionError::Serialization(e.to_string())),
            Self::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// How email family keys are reduced to tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FamilyKeyMode {
    /// Hash into `keyspace` buckets, giving short tokens like `EMAIL_THREAD_0042`.
    /// Unrelated threads can collide.
    Token { keyspace: u64 },
    /// Keep the full digest. No collisions in practice.
    Exact,
}

impl Default for FamilyKeyMode {
    fn default() -> Self {
        Self::Token { keyspace: 10_000 }
    }
}

/// Worker, timeout, and rendering limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Per-call timeout for the extraction collaborator, in seconds.
    pub timeout: u64,
    /// Budget for all collaborator work on one file, in seconds.
    pub max_file_timeout: u64,
    /// Budget for the whole batch, in seconds.
    pub max_total_timeout: u64,
    /// Worker pool width. `0` means one worker per CPU.
    pub max_workers: usize,
    pub pdf_dpi: u32,
    /// Pages rendered per rasterization call.
    pub pdf_chunk_size: u32,
    pub family_key_mode: FamilyKeyMode,
    /// Timeout for each extraction call in the email family pass, in seconds.
    pub family_pass_timeout: u64,
    /// Group email files into families before dispatch.
    pub email_family_grouping: bool,
    /// Raise EndBates to the last rendered page's number.
    pub advance_end_bates: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            timeout: 500,
            max_file_timeout: 300,
            max_total_timeout: 3600,
            max_workers: 4,
            pdf_dpi: 150,
            pdf_chunk_size: 5,
            family_key_mode: FamilyKeyMode::default(),
            family_pass_timeout: 30,
            email_family_grouping: true,
            advance_end_bates: false,
        }
    }
}

impl ProcessingConfig {
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.max_file_timeout)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.max_total_timeout)
    }

    pub fn family_pass_timeout(&self) -> Duration {
        Duration::from_secs(self.family_pass_timeout)
    }

    /// Effective worker count.
    pub fn workers(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.max_workers
        }
    }
}

/// Where the stamp goes on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StampPosition {
    #[default]
    BottomRight,
    TopRight,
    BottomLeft,
    TopLeft,
    Center,
}

/// Placement and contrast settings handed to the stamping collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampConfig {
    pub font_size: u32,
    pub margin: u32,
    pub position: StampPosition,
    pub text_color_light: [u8; 3],
    pub text_color_dark: [u8; 3],
    /// Mean background brightness below which the light colour is used.
    pub contrast_threshold: u8,
    pub add_border: bool,
    pub shadow: bool,
    pub quality: u8,
    /// Lowercase extensions eligible for stamping.
    pub supported_formats: Vec<String>,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            font_size: 30,
            margin: 20,
            position: StampPosition::BottomRight,
            text_color_light: [255, 255, 255],
            text_color_dark: [0, 0, 0],
            contrast_threshold: 128,
            add_border: false,
            shadow: false,
            quality: 95,
            supported_formats: ["jpg", "jpeg", "tiff", "tif", "png", "bmp"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl StampConfig {
    pub fn supports(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.supported_formats.iter().any(|f| f.eq_ignore_ascii_case(&ext))
    }
}
