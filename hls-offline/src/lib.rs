//! hls-offline library crate.
//!
//! A persistent download queue for offline HLS playback. Titles are queued
//! with their stream URL and handed one at a time to a [`TransferEngine`];
//! the catalog survives restarts and observers receive catalog and progress
//! snapshots through `watch` channels.

pub mod catalog;
pub mod config;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod utils;

pub use catalog::{Catalog, CatalogStore, JsonCatalogStore};
pub use config::ManagerConfig;
pub use domain::{DownloadRecord, DownloadStatus, JobId, ProgressEntry, TimeRange};
pub use downloader::{DownloadManager, EngineError, EngineEvent, TransferEngine};
pub use error::{Error, Result};
