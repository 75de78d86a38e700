//! Download Manager module for offline HLS playback.
//!
//! The Download Manager is responsible for:
//! - Keeping the persistent catalog of downloads
//! - Running at most one engine transfer at a time, oldest waiting first
//! - Reacting to engine progress and completion callbacks
//! - Publishing catalog and progress snapshots to observers

pub mod cleanup;
pub mod engine;
pub mod registry;
pub mod transition;

mod manager;
mod messages;

pub use engine::{
    EngineError, EngineEvent, EngineEventReceiver, EngineEventSender, TransferEngine,
    event_channel,
};
pub use manager::DownloadManager;
pub use messages::ManagerState;
pub use registry::{CatalogPublisher, ProgressRegistry, ProgressSnapshot};
pub use transition::{FollowUp, Transition};
