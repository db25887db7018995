//! State shared by every worker in a run.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::family::FamilyRegistry;
use crate::pages::{PageEntry, sort_pages};
use crate::record::ProductionRecord;

#[derive(Debug, Default)]
struct Published {
    records: Vec<ProductionRecord>,
    pages: Vec<PageEntry>,
    sealed: bool,
}

/// Records, page entries, and family ids accumulated during a run.
///
/// Workers only append, one document at a time. Once sealed, further documents are
/// refused so that a file still running at the cutoff never reaches the artifacts.
/// A lock poisoned by a panicking worker is recovered; each publish is a single
/// operation under the lock.
#[derive(Debug, Default)]
pub struct SharedState {
    published: Mutex<Published>,
    families: FamilyRegistry,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn families(&self) -> &FamilyRegistry {
        &self.families
    }

    fn lock(&self) -> MutexGuard<'_, Published> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a document's record and its pages together. Returns `false`, publishing
    /// nothing, if the state has been sealed.
    pub fn publish(&self, record: ProductionRecord, pages: Vec<PageEntry>) -> bool {
        let mut published = self.lock();
        if published.sealed {
            return false;
        }
        published.records.push(record);
        published.pages.extend(pages);
        true
    }

    /// Refuse every later [`publish`](Self::publish).
    pub fn seal(&self) {
        self.lock().sealed = true;
    }

    /// Copy of the published records in BegBates order.
    pub fn records_sorted(&self) -> Vec<ProductionRecord> {
        let mut out = self.lock().records.clone();
        out.sort_by(|a, b| a.beg_bates.cmp(&b.beg_bates));
        out
    }

    /// Copy of the published page entries grouped by document, in page order.
    pub fn pages_sorted(&self) -> Vec<PageEntry> {
        let mut out = self.lock().pages.clone();
        sort_pages(&mut out);
        out
    }
}
