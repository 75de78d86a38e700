//! Download status state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle states of a download record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Decoded from an unrecognized or missing status value.
    #[default]
    Unknown,
    /// The last job failed with a non-transient error.
    Error,
    /// Queued, waiting for the single transfer slot.
    Waiting,
    /// Paused by the user or by start-up reconciliation.
    Suspended,
    /// Owns the transfer slot.
    Downloading,
    /// Finished. Terminal.
    Done,
}

impl DownloadStatus {
    pub const ALL: [DownloadStatus; 6] = [
        Self::Unknown,
        Self::Error,
        Self::Waiting,
        Self::Suspended,
        Self::Downloading,
        Self::Done,
    ];

    /// Convert to the persisted string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Error => "error",
            Self::Waiting => "waiting",
            Self::Suspended => "suspended",
            Self::Downloading => "downloading",
            Self::Done => "done",
        }
    }

    /// Parse from the persisted string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(Self::Unknown),
            "error" => Some(Self::Error),
            "waiting" => Some(Self::Waiting),
            "suspended" => Some(Self::Suspended),
            "downloading" => Some(Self::Downloading),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// States that must not survive a process restart.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Waiting | Self::Downloading)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: DownloadStatus) -> bool {
        use DownloadStatus::*;

        match (self, target) {
            (from, to) if *from == to => true,

            (Unknown, Waiting) => true,

            (Waiting, Downloading | Suspended) => true,

            // Downloading -> Waiting is the transient-failure re-issue path.
            (Downloading, Waiting | Done | Error | Suspended) => true,

            (Error | Suspended, Waiting) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: DownloadStatus) -> Result<DownloadStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        for status in DownloadStatus::ALL {
            assert_eq!(DownloadStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DownloadStatus::parse("status"), None);
        assert_eq!(DownloadStatus::parse("DONE"), None);
    }

    #[test]
    fn test_done_is_terminal() {
        for target in DownloadStatus::ALL {
            if target != DownloadStatus::Done {
                assert!(!DownloadStatus::Done.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_manual_restore_paths() {
        assert!(DownloadStatus::Error.can_transition_to(DownloadStatus::Waiting));
        assert!(DownloadStatus::Suspended.can_transition_to(DownloadStatus::Waiting));
        assert!(!DownloadStatus::Error.can_transition_to(DownloadStatus::Downloading));
        assert!(!DownloadStatus::Suspended.can_transition_to(DownloadStatus::Downloading));
    }

    #[test]
    fn test_only_downloading_reaches_done() {
        for from in DownloadStatus::ALL {
            let allowed = from.can_transition_to(DownloadStatus::Done);
            assert_eq!(
                allowed,
                matches!(from, DownloadStatus::Downloading | DownloadStatus::Done)
            );
        }
    }

    #[test]
    fn test_transition_to_error_message() {
        let err = DownloadStatus::Done
            .transition_to(DownloadStatus::Waiting)
            .unwrap_err();
        assert!(err.to_string().contains("from done to waiting"));
    }

    #[test]
    fn test_in_flight() {
        assert!(DownloadStatus::Waiting.is_in_flight());
        assert!(DownloadStatus::Downloading.is_in_flight());
        assert!(!DownloadStatus::Suspended.is_in_flight());
        assert!(!DownloadStatus::Done.is_in_flight());
    }
}
