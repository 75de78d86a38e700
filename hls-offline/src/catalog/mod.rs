//! The catalog: every tracked record, persisted as one document.

mod store;

pub use store::{CatalogStore, JsonCatalogStore};

use serde::{Deserialize, Serialize};

use crate::domain::{DownloadRecord, DownloadStatus, JobId};

/// Ordered collection of download records.
///
/// Insertion order carries no meaning beyond breaking `added_at` ties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    records: Vec<DownloadRecord>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<DownloadRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[DownloadRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find_by_title(&self, title: &str) -> Option<&DownloadRecord> {
        self.records.iter().find(|r| r.title == title)
    }

    pub fn find_by_url(&self, url: &str) -> Option<&DownloadRecord> {
        self.records.iter().find(|r| r.url == url)
    }

    pub fn find_by_job_id(&self, job_id: JobId) -> Option<&DownloadRecord> {
        self.records.iter().find(|r| r.engine_job_id == Some(job_id))
    }

    pub fn get_mut(&mut self, title: &str) -> Option<&mut DownloadRecord> {
        self.records.iter_mut().find(|r| r.title == title)
    }

    /// Append a record unless an identical entity (title OR url) is present.
    ///
    /// Returns `false` when the record was not added.
    pub fn insert(&mut self, record: DownloadRecord) -> bool {
        if self.records.iter().any(|r| *r == record) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Replace the record with the same title.
    pub fn replace(&mut self, record: DownloadRecord) -> bool {
        match self.get_mut(&record.title) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, title: &str) -> Option<DownloadRecord> {
        let index = self.records.iter().position(|r| r.title == title)?;
        Some(self.records.remove(index))
    }

    /// Oldest `waiting` record. Equal `added_at` values resolve to catalog order.
    pub fn next_waiting(&self) -> Option<&DownloadRecord> {
        self.records
            .iter()
            .filter(|r| r.status == DownloadStatus::Waiting)
            .min_by_key(|r| r.added_at)
    }

    pub fn count_with_status(&self, status: DownloadStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Demote every `waiting`/`downloading` record to `suspended`.
    ///
    /// Engine state is untrusted after a restart until the user resumes.
    /// Returns the affected titles.
    pub fn reconcile_after_restart(&mut self) -> Vec<String> {
        let mut demoted = Vec::new();
        for record in self.records.iter_mut().filter(|r| r.status.is_in_flight()) {
            record.set_status(DownloadStatus::Suspended);
            demoted.push(record.title.clone());
        }
        demoted
    }
}
