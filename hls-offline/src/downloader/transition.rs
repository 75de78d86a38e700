//! Pure reactions to engine callbacks.
//!
//! Each function maps `(record, callback)` to the updated record plus the
//! side effects the manager has to carry out. Nothing here touches the
//! engine, the store or the registry.

use std::path::{Path, PathBuf};

use crate::domain::{DownloadRecord, DownloadStatus, ProgressEntry, TimeRange, percent_complete};

use super::engine::EngineError;

/// What the scheduler does after applying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Keep the current job.
    None,
    /// Re-issue a job for the same record right away.
    Reissue,
    /// Release the slot and start the next waiting record.
    Advance,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub record: DownloadRecord,
    /// Whether the catalog changed and must be persisted.
    pub changed: bool,
    pub progress: Option<ProgressEntry>,
    pub follow_up: FollowUp,
}

impl Transition {
    fn unchanged(record: &DownloadRecord) -> Self {
        Self {
            record: record.clone(),
            changed: false,
            progress: None,
            follow_up: FollowUp::None,
        }
    }
}

/// Progress report: recompute the percentage from all reported ranges.
pub fn on_progress(record: &DownloadRecord, loaded: &[TimeRange], expected: TimeRange) -> Transition {
    Transition {
        progress: Some(ProgressEntry::downloading(percent_complete(loaded, expected))),
        ..Transition::unchanged(record)
    }
}

/// Artifact location reported. The status stays as is until completion.
pub fn on_artifact_ready(record: &DownloadRecord, location: &Path, sandbox_root: &Path) -> Transition {
    let mut updated = record.clone();
    updated.local_path = Some(relative_to_sandbox(location, sandbox_root));
    updated.touch();
    Transition {
        record: updated,
        changed: true,
        progress: None,
        follow_up: FollowUp::None,
    }
}

/// Job finished, with or without an error.
pub fn on_completed(
    record: &DownloadRecord,
    error: Option<&EngineError>,
    transient_codes: &[i64],
) -> Transition {
    let mut updated = record.clone();
    match error {
        None => {
            updated.set_status(DownloadStatus::Done);
            Transition {
                record: updated,
                changed: true,
                progress: Some(ProgressEntry::done()),
                follow_up: FollowUp::Advance,
            }
        }
        Some(err) if err.is_transient(transient_codes) => {
            updated.set_status(DownloadStatus::Waiting);
            Transition {
                record: updated,
                changed: true,
                progress: None,
                follow_up: FollowUp::Reissue,
            }
        }
        Some(err) => {
            updated.fail(err.message.clone());
            Transition {
                record: updated,
                changed: true,
                progress: Some(ProgressEntry::failed(Some(err.message.clone()))),
                follow_up: FollowUp::Advance,
            }
        }
    }
}

/// Express `location` relative to `sandbox_root` when it lies beneath it.
pub fn relative_to_sandbox(location: &Path, sandbox_root: &Path) -> PathBuf {
    location
        .strip_prefix(sandbox_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| location.to_path_buf())
}
