//! Last-value publishers for the catalog and per-title progress.
//!
//! Both are backed by `tokio::sync::watch`: observers always see the full
//! current value (never a diff), and a subscriber created late immediately
//! observes the latest state.

use std::collections::HashMap;

use tokio::sync::watch;

use crate::domain::{DownloadRecord, ProgressEntry};

/// Full progress map keyed by title.
pub type ProgressSnapshot = HashMap<String, ProgressEntry>;

/// In-memory progress registry. Not persisted.
#[derive(Debug)]
pub struct ProgressRegistry {
    tx: watch::Sender<ProgressSnapshot>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProgressSnapshot::new());
        Self { tx }
    }

    /// Overwrite the entry for `title` and notify every observer.
    pub fn publish(&self, title: &str, entry: ProgressEntry) {
        self.tx.send_modify(|map| {
            map.insert(title.to_string(), entry);
        });
    }

    /// Drop the entry for `title`, notifying only when one existed.
    pub fn remove(&self, title: &str) {
        self.tx.send_if_modified(|map| map.remove(title).is_some());
    }

    pub fn get(&self, title: &str) -> Option<ProgressEntry> {
        self.tx.borrow().get(title).cloned()
    }

    pub fn current_snapshot(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }

    /// Re-emit the current map even though nothing changed.
    pub fn republish(&self) {
        self.tx.send_modify(|_| {});
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes the full catalog after every mutation.
#[derive(Debug)]
pub struct CatalogPublisher {
    tx: watch::Sender<Vec<DownloadRecord>>,
}

impl CatalogPublisher {
    pub fn new(initial: Vec<DownloadRecord>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn publish(&self, records: Vec<DownloadRecord>) {
        self.tx.send_replace(records);
    }

    pub fn republish(&self) {
        self.tx.send_modify(|_| {});
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<DownloadRecord>> {
        self.tx.subscribe()
    }
}
