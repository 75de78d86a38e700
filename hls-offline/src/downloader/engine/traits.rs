//! Transfer engine trait and callback types.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{JobId, TimeRange};
use crate::{Error, Result};

/// Engine code for a generic network-layer failure.
pub const NETWORK_FAILURE_CODE: i64 = 2;

/// Engine code for an operation cancelled by the system.
pub const CANCELLED_BY_SYSTEM_CODE: i64 = -999;

/// Error reported by the engine when a job completes unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub code: i64,
    pub message: String,
}

impl EngineError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the code means "interrupted" rather than "failed".
    pub fn is_transient(&self, transient_codes: &[i64]) -> bool {
        transient_codes.contains(&self.code)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A permanent engine failure, as surfaced to the rest of the crate.
impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        Error::TransferFailed(err.to_string())
    }
}

/// Callbacks delivered by the engine.
///
/// For a single job the engine sends any number of `Progress` events followed
/// by an optional `ArtifactReady` and exactly one `Completed`.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Loaded ranges so far, against the expected total.
    Progress {
        job_id: JobId,
        loaded: Vec<TimeRange>,
        expected: TimeRange,
    },
    /// The job's package was written to `location`.
    ArtifactReady { job_id: JobId, location: PathBuf },
    /// The job finished, successfully when `error` is `None`.
    Completed {
        job_id: JobId,
        error: Option<EngineError>,
    },
    /// Background events were drained; a pending completion handler may run.
    AllEventsDrained,
}

impl EngineEvent {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::Progress { job_id, .. }
            | Self::ArtifactReady { job_id, .. }
            | Self::Completed { job_id, .. } => Some(*job_id),
            Self::AllEventsDrained => None,
        }
    }
}

/// Sending half handed to engine implementations.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    tx: mpsc::Sender<EngineEvent>,
}

/// Receiving half consumed by the download manager.
pub type EngineEventReceiver = mpsc::Receiver<EngineEvent>;

/// Create the callback channel between an engine and the manager.
pub fn event_channel(capacity: usize) -> (EngineEventSender, EngineEventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EngineEventSender { tx }, rx)
}

impl EngineEventSender {
    pub async fn send(&self, event: EngineEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::ManagerStopped)
    }

    /// Non-async variant for engines that call back from plain threads.
    pub fn try_send(&self, event: EngineEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::Engine("engine event queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => Error::ManagerStopped,
        })
    }

    pub async fn progress(
        &self,
        job_id: JobId,
        loaded: Vec<TimeRange>,
        expected: TimeRange,
    ) -> Result<()> {
        self.send(EngineEvent::Progress {
            job_id,
            loaded,
            expected,
        })
        .await
    }

    pub async fn artifact_ready(&self, job_id: JobId, location: impl Into<PathBuf>) -> Result<()> {
        self.send(EngineEvent::ArtifactReady {
            job_id,
            location: location.into(),
        })
        .await
    }

    pub async fn completed(&self, job_id: JobId, error: Option<EngineError>) -> Result<()> {
        self.send(EngineEvent::Completed { job_id, error }).await
    }

    pub async fn all_events_drained(&self) -> Result<()> {
        self.send(EngineEvent::AllEventsDrained).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Boundary to the external transfer engine.
///
/// The engine performs the network fetch and manifest handling. It reports
/// back through an [`EngineEventSender`] obtained from [`event_channel`].
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Issue a new job. Returns `Error::EngineRejectedJob` when the engine
    /// refuses, e.g. on an unsupported platform.
    async fn create_job(&self, url: &str, title: &str) -> Result<JobId>;

    /// Jobs the engine still tracks.
    async fn live_jobs(&self) -> Result<Vec<JobId>>;

    async fn resume_job(&self, job_id: JobId) -> Result<()>;

    /// Best effort. A suspended job is generally not resumable with its
    /// partial bytes.
    async fn suspend_job(&self, job_id: JobId) -> Result<()>;

    async fn cancel_job(&self, job_id: JobId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_codes() {
        let codes = [NETWORK_FAILURE_CODE, CANCELLED_BY_SYSTEM_CODE];
        assert!(EngineError::new(2, "lost").is_transient(&codes));
        assert!(EngineError::new(-999, "cancelled").is_transient(&codes));
        assert!(!EngineError::new(-1100, "file does not exist").is_transient(&codes));
    }

    #[test]
    fn test_permanent_failure_converts_to_transfer_failed() {
        let err = Error::from(EngineError::new(-1100, "file does not exist"));
        assert!(matches!(&err, Error::TransferFailed(msg) if msg.contains("-1100")));
        assert_eq!(
            err.to_string(),
            "transfer failed: file does not exist (code -1100)"
        );
    }

    #[test]
    fn test_event_job_id() {
        let event = EngineEvent::Completed {
            job_id: 9,
            error: None,
        };
        assert_eq!(event.job_id(), Some(9));
        assert_eq!(EngineEvent::AllEventsDrained.job_id(), None);
    }

    #[tokio::test]
    async fn test_sender_reports_closed_receiver() {
        let (tx, rx) = event_channel(4);
        tx.completed(1, None).await.unwrap();
        drop(rx);
        assert!(tx.is_closed());
        assert!(matches!(
            tx.all_events_drained().await,
            Err(Error::ManagerStopped)
        ));
    }

    #[test]
    fn test_try_send_full_queue() {
        let (tx, _rx) = event_channel(1);
        tx.try_send(EngineEvent::AllEventsDrained).unwrap();
        assert!(matches!(
            tx.try_send(EngineEvent::AllEventsDrained),
            Err(Error::Engine(_))
        ));
    }
}
