//! Per-title progress entries and range aggregation.

use serde::{Deserialize, Serialize};

use super::record::DownloadRecord;
use super::status::DownloadStatus;

/// Last known progress of one title. Held in memory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Percentage in `0.0..=100.0`.
    pub progress: f64,
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProgressEntry {
    pub fn downloading(percent: f64) -> Self {
        Self {
            progress: percent.clamp(0.0, 100.0),
            status: DownloadStatus::Downloading,
            description: None,
        }
    }

    pub fn done() -> Self {
        Self {
            progress: 100.0,
            status: DownloadStatus::Done,
            description: None,
        }
    }

    pub fn failed(description: Option<String>) -> Self {
        Self {
            progress: 0.0,
            status: DownloadStatus::Error,
            description,
        }
    }

    /// Rebuild an entry from catalog state when no callback has been seen.
    pub fn from_record(record: &DownloadRecord) -> Self {
        match record.status {
            DownloadStatus::Done => Self::done(),
            DownloadStatus::Error => Self::failed(record.error_description.clone()),
            status => Self {
                progress: 0.0,
                status,
                description: None,
            },
        }
    }
}

/// A loaded or expected span of media time, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub duration: f64,
}

impl TimeRange {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }
}

/// Sum of `loaded / expected` over every reported range, as a percentage.
///
/// Recomputed from scratch on every report. Overlapping ranges may push the
/// raw sum past 100, so the result is clamped.
pub fn percent_complete(loaded: &[TimeRange], expected: TimeRange) -> f64 {
    if expected.duration.is_nan() || expected.duration <= 0.0 {
        return 0.0;
    }
    let fraction: f64 = loaded
        .iter()
        .filter(|range| range.duration.is_finite() && range.duration > 0.0)
        .map(|range| range.duration / expected.duration)
        .sum();
    (fraction * 100.0).clamp(0.0, 100.0)
}
