//! Crate-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("URL `{url}` is already bound to title `{existing_title}`")]
    UrlBoundToOtherTitle { url: String, existing_title: String },

    #[error("title `{title}` is already bound to URL `{existing_url}`")]
    TitleBoundToOtherUrl { title: String, existing_url: String },

    #[error("download `{title}` has already finished")]
    AlreadyDone { title: String },

    #[error("catalog not found at {}", path.display())]
    CatalogNotFound { path: PathBuf },

    #[error("Serialization error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("IO error while {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transfer engine rejected job for `{title}`: {reason}")]
    EngineRejectedJob { title: String, reason: String },

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("transfer engine error: {0}")]
    Engine(String),

    #[error("download manager has stopped")]
    ManagerStopped,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn engine_rejected(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineRejectedJob {
            title: title.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error came from `enqueue` input validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyTitle
                | Self::InvalidUrl { .. }
                | Self::UrlBoundToOtherTitle { .. }
                | Self::TitleBoundToOtherUrl { .. }
                | Self::AlreadyDone { .. }
        )
    }
}
