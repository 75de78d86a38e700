//! Download record entity and its persisted JSON shape.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;
use super::status::DownloadStatus;
use crate::utils::time;

/// A single tracked download.
///
/// Equality follows the catalog identity rule: two records are the same
/// entity when their titles match **or** their URLs match. This relation is
/// not transitive (A may share a title with B and a URL with C while B and C
/// are unrelated), so it is only `PartialEq` and must not be used as a map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RecordRepr", into = "RecordRepr")]
pub struct DownloadRecord {
    pub title: String,
    pub url: String,
    /// Artifact location relative to the sandbox root, set once the engine
    /// reports where the package landed.
    pub local_path: Option<PathBuf>,
    pub status: DownloadStatus,
    /// Identifier of the last job issued to the transfer engine.
    pub engine_job_id: Option<JobId>,
    /// Set once at creation.
    pub added_at: DateTime<Utc>,
    pub last_changed_at: DateTime<Utc>,
    /// Only present while `status == Error`.
    pub error_description: Option<String>,
}

impl DownloadRecord {
    /// Create a new record in the `waiting` state.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let now = time::now();
        Self {
            title: title.into(),
            url: url.into(),
            local_path: None,
            status: DownloadStatus::Waiting,
            engine_job_id: None,
            added_at: now,
            last_changed_at: now,
            error_description: None,
        }
    }

    /// Catalog identity: title OR url.
    pub fn same_entity(&self, other: &DownloadRecord) -> bool {
        self.title == other.title || self.url == other.url
    }

    /// Set the status, clearing the error description when leaving `Error`.
    pub fn set_status(&mut self, status: DownloadStatus) {
        self.status = status;
        if status != DownloadStatus::Error {
            self.error_description = None;
        }
        self.touch();
    }

    /// Move into `Error` with the engine's message.
    pub fn fail(&mut self, description: impl Into<String>) {
        self.status = DownloadStatus::Error;
        self.error_description = Some(description.into());
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_changed_at = time::now();
    }

    pub fn is_done(&self) -> bool {
        self.status == DownloadStatus::Done
    }
}

impl PartialEq for DownloadRecord {
    fn eq(&self, other: &Self) -> bool {
        self.same_entity(other)
    }
}

impl std::fmt::Display for DownloadRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{title: {:?}, url: {:?}, status: {}, local_path: {:?}, job: {}, added: {}, changed: {}}}",
            self.title,
            self.url,
            self.status,
            self.local_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            self.engine_job_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.added_at.to_rfc3339(),
            self.last_changed_at.to_rfc3339(),
        )
    }
}

/// On-disk shape. Every field is optional on decode so old or hand-edited
/// catalogs never fail on a missing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordRepr {
    title: Option<String>,
    url: Option<String>,
    status: Option<String>,
    local_path: Option<String>,
    task_identifier: Option<JobId>,
    add_date: Option<f64>,
    last_change_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_description: Option<String>,
}

impl From<RecordRepr> for DownloadRecord {
    fn from(repr: RecordRepr) -> Self {
        let status = repr
            .status
            .as_deref()
            .and_then(DownloadStatus::parse)
            .unwrap_or_default();
        let error_description = if status == DownloadStatus::Error {
            repr.error_description
        } else {
            None
        };
        Self {
            title: repr.title.unwrap_or_default(),
            url: repr.url.unwrap_or_default(),
            local_path: repr.local_path.map(PathBuf::from),
            status,
            engine_job_id: repr.task_identifier,
            added_at: repr
                .add_date
                .map(time::epoch_secs_to_datetime)
                .unwrap_or_else(time::now),
            last_changed_at: repr
                .last_change_date
                .map(time::epoch_secs_to_datetime)
                .unwrap_or_else(time::now),
            error_description,
        }
    }
}

impl From<DownloadRecord> for RecordRepr {
    fn from(record: DownloadRecord) -> Self {
        Self {
            title: Some(record.title),
            url: Some(record.url),
            status: Some(record.status.as_str().to_string()),
            local_path: record
                .local_path
                .map(|p| p.to_string_lossy().into_owned()),
            task_identifier: record.engine_job_id,
            add_date: Some(time::datetime_to_epoch_secs(record.added_at)),
            last_change_date: Some(time::datetime_to_epoch_secs(record.last_changed_at)),
            error_description: record.error_description,
        }
    }
}
