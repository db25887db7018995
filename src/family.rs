//! Document family resolution.
//!
//! A family is a set of related documents sharing one integer id: an email thread, a
//! memo and its attachments, the revisions of a contract. Ids come from a single
//! [`FamilyRegistry`] shared by every worker, and are handed out in first-seen order
//! starting at 1.
//!
//! Two mechanisms feed the registry:
//!
//! - The **email pass** ([`FamilyResolver::resolve_emails`]) runs once, sequentially, in
//!   Bates order before any worker starts. Each `msg`/`eml`/`pst` file gets a key from
//!   the first signal present: `Thread-Index`, `Message-ID`, `Subject`, `From`, then its
//!   file name. The signal is hashed into a short token such as `EMAIL_THREAD_0042`.
//! - The **filename heuristic** ([`heuristic_key`]) runs inside each worker for files the
//!   email pass did not cover, grouping attachments with their parent and revisions with
//!   each other.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collaborators::{Extractor, call_with_timeout};
use crate::config::FamilyKeyMode;
use crate::error::Phase;
use crate::metadata::{FormatTag, RawMetadata};

/// Key → family id map shared by all workers for one run.
#[derive(Debug)]
pub struct FamilyRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug)]
struct RegistryInner {
    ids: HashMap<String, u64>,
    next: u64,
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FamilyRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                ids: HashMap::new(),
                next: 1,
            }),
        }
    }

    /// The id for `key`, creating the next id if this is the first time it is seen.
    ///
    /// The lookup and the insert happen under one lock, so two workers racing on a new
    /// key always agree on its id.
    pub fn get_or_create(&self, key: &str) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&id) = inner.ids.get(key) {
            return id;
        }
        let id = inner.next;
        inner.next += 1;
        inner.ids.insert(key.to_string(), id);
        id
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.ids.get(key).copied()
    }

    /// Number of distinct families.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the map, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.ids.iter().map(|(k, &v)| (k.clone(), v)).collect()
    }
}

/// A file's family: the key that grouped it and the id the registry gave that key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FamilyAssignment {
    pub key: String,
    pub id: u64,
}

/// Result of the email pass.
#[derive(Debug, Clone, Default)]
pub struct EmailFamilies {
    assignments: HashMap<PathBuf, FamilyAssignment>,
    /// Files whose metadata could not be read and fell back to a filename key.
    pub fallbacks: usize,
}

impl EmailFamilies {
    pub fn get(&self, file: &Path) -> Option<&FamilyAssignment> {
        self.assignments.get(file)
    }

    /// Number of email files assigned.
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Number of distinct email families.
    pub fn family_count(&self) -> usize {
        let mut ids: Vec<u64> = self.assignments.values().map(|a| a.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// The signal an email family key was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilySignal {
    ThreadIndex,
    MessageId,
    Subject,
    Sender,
    FileName,
}

impl FamilySignal {
    fn label(self) -> &'static str {
        match self {
            Self::ThreadIndex => "THREAD",
            Self::MessageId => "MSGID",
            Self::Subject => "SUBJECT",
            Self::Sender => "FROM",
            Self::FileName => "FILE",
        }
    }
}

/// Derives email family keys and runs the email pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct FamilyResolver {
    mode: FamilyKeyMode,
}

impl FamilyResolver {
    pub fn new(mode: FamilyKeyMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> FamilyKeyMode {
        self.mode
    }

    /// Hash `value` into a token for `signal` according to the key mode.
    pub fn token(&self, signal: FamilySignal, value: &str) -> String {
        let digest = Sha256::digest(value.as_bytes());
        match self.mode {
            FamilyKeyMode::Token { keyspace } => {
                let keyspace = keyspace.max(1);
                let mut head = [0u8; 8];
                head.copy_from_slice(&digest[..8]);
                let bucket = u64::from_be_bytes(head) % keyspace;
                let width = (keyspace - 1).max(1).to_string().len();
                format!("EMAIL_{}_{bucket:0width$}", signal.label())
            }
            FamilyKeyMode::Exact => format!("EMAIL_{}_{digest:x}", signal.label()),
        }
    }

    /// Family key for an email with metadata `meta`, falling back to `file_name` when
    /// no thread, message id, subject, or sender is present.
    pub fn family_key(&self, meta: &RawMetadata, file_name: &str) -> String {
        let (signal, value) = Self::signal(meta, file_name);
        self.token(signal, value)
    }

    /// Family key for an email whose metadata could not be read.
    pub fn file_key(&self, file_name: &str) -> String {
        self.token(FamilySignal::FileName, file_name)
    }

    fn signal<'a>(meta: &'a RawMetadata, file_name: &'a str) -> (FamilySignal, &'a str) {
        [
            (FamilySignal::ThreadIndex, "Thread-Index"),
            (FamilySignal::MessageId, "Message-ID"),
            (FamilySignal::Subject, "Subject"),
            (FamilySignal::Sender, "From"),
        ]
        .into_iter()
        .find_map(|(signal, key)| meta.first(key).map(|v| (signal, v)))
        .unwrap_or((FamilySignal::FileName, file_name))
    }

    /// Run the email pass over `files` (already in Bates order).
    ///
    /// Only email-like files are extracted. An extraction failure or timeout is logged
    /// and the file is keyed by its name instead, so every email file ends up in exactly
    /// one family.
    pub fn resolve_emails(
        &self,
        files: &[PathBuf],
        extractor: &Arc<dyn Extractor>,
        timeout: Duration,
        registry: &FamilyRegistry,
    ) -> EmailFamilies {
        let mut out = EmailFamilies::default();

        for file in files.iter().filter(|f| FormatTag::from_path(f).is_email()) {
            let name = file_name(file);
            let extractor = Arc::clone(extractor);
            let path = file.clone();
            let result = call_with_timeout(Phase::FamilyPass, &name, timeout, move || {
                extractor.extract(&path)
            });

            let key = match result {
                Ok(doc) => self.family_key(&doc.metadata, &name),
                Err(e) => {
                    tracing::warn!(
                        file = %name,
                        error = %e,
                        "Could not analyze email file, keying family by file name"
                    );
                    out.fallbacks += 1;
                    self.file_key(&name)
                }
            };
            let id = registry.get_or_create(&key);
            tracing::debug!(file = %name, family_key = %key, family_id = id, "Email family");
            out.assignments.insert(file.clone(), FamilyAssignment { key, id });
        }

        out
    }

    /// Family for one file inside a worker: the email pass result if there is one,
    /// otherwise the filename heuristic, otherwise none.
    pub fn resolve_file(
        &self,
        file: &Path,
        emails: &EmailFamilies,
        registry: &FamilyRegistry,
    ) -> Option<FamilyAssignment> {
        if let Some(assigned) = emails.get(file) {
            return Some(assigned.clone());
        }
        let key = heuristic_key(&file_name(file))?;
        let id = registry.get_or_create(&key);
        Some(FamilyAssignment { key, id })
    }
}

static ATTACHMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])(?:attachment|att)\d*(?:[^a-z]|$)").expect("valid attachment regex")
});

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z])(?:version|revision|ver|rev|v)[\s_\-]?\d+")
        .expect("valid version regex")
});

/// Secondary family key from file-name markers, for files the email pass did not cover.
///
/// - Attachment marker (`attachment`, `att`, `att2` as a separate word): key from the
///   parent stem, the text before the first `_`, or before the first `.` if there is none.
/// - Version marker (`v2`, `rev3`, `version 4`, `revision1`): key from the name with the
///   marker removed.
pub fn heuristic_key(file_name: &str) -> Option<String> {
    let lower = file_name.to_lowercase();

    if ATTACHMENT.is_match(&lower) {
        let parent = match lower.split_once('_') {
            Some((head, _)) => head,
            None => lower.split('.').next().unwrap_or(&lower),
        };
        return Some(format!("ATTACH:{parent}"));
    }

    if VERSION.is_match(&lower) {
        let base = VERSION.replace_all(&lower, "");
        return Some(format!("VERSION:{}", base.trim()));
    }

    None
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
