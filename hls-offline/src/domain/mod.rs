//! Domain types: records, statuses and progress.

pub mod progress;
pub mod record;
pub mod status;

pub use progress::{ProgressEntry, TimeRange, percent_complete};
pub use record::DownloadRecord;
pub use status::DownloadStatus;

/// Identifier assigned by the transfer engine to an issued job.
pub type JobId = i64;
