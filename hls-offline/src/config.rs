//! Download manager configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::downloader::engine::{CANCELLED_BY_SYSTEM_CODE, NETWORK_FAILURE_CODE};
use crate::{Error, Result};

/// Default catalog file name inside `data_dir`.
pub const DEFAULT_CATALOG_FILE: &str = "data.json";

/// Default extension of engine packages.
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "movpkg";

/// Default mailbox capacity for the manager actor.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Configuration for the Download Manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Private document root holding the catalog.
    pub data_dir: PathBuf,
    /// Catalog file name inside `data_dir`.
    pub catalog_file: String,
    /// Base for relative artifact paths.
    pub sandbox_root: PathBuf,
    /// Directory scanned for packages when a record is removed.
    pub artifact_dir: PathBuf,
    /// Package extension, without the dot.
    pub artifact_extension: String,
    /// Engine error codes treated as interruptions and re-issued.
    pub transient_error_codes: Vec<i64>,
    /// Manager actor mailbox capacity.
    pub mailbox_capacity: usize,
    /// Engine callback channel capacity.
    pub engine_event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            data_dir: home.join("Documents").join("hls-offline"),
            catalog_file: DEFAULT_CATALOG_FILE.to_string(),
            sandbox_root: home.clone(),
            artifact_dir: home.join("Library"),
            artifact_extension: DEFAULT_ARTIFACT_EXTENSION.to_string(),
            transient_error_codes: vec![NETWORK_FAILURE_CODE, CANCELLED_BY_SYSTEM_CODE],
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            engine_event_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl ManagerConfig {
    /// Root all paths under `base`. Handy for tests and embedded hosts.
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            data_dir: base.join("Documents").join("hls-offline"),
            sandbox_root: base.clone(),
            artifact_dir: base.join("Library"),
            ..Self::default()
        }
    }

    /// Defaults overridden by `HLS_OFFLINE_*` environment variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup("HLS_OFFLINE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("HLS_OFFLINE_CATALOG_FILE") {
            config.catalog_file = file;
        }
        if let Some(root) = lookup("HLS_OFFLINE_SANDBOX_ROOT") {
            config.sandbox_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("HLS_OFFLINE_ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(dir);
        }
        if let Some(ext) = lookup("HLS_OFFLINE_ARTIFACT_EXTENSION") {
            config.artifact_extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(codes) = lookup("HLS_OFFLINE_TRANSIENT_CODES") {
            config.transient_error_codes = parse_codes(&codes)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.catalog_file.trim().is_empty() {
            return Err(Error::config("catalog_file must not be empty"));
        }
        if self.artifact_extension.trim().is_empty() {
            return Err(Error::config("artifact_extension must not be empty"));
        }
        if self.mailbox_capacity == 0 || self.engine_event_capacity == 0 {
            return Err(Error::config("channel capacities must be greater than zero"));
        }
        Ok(())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(&self.catalog_file)
    }
}

fn parse_codes(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|e| Error::config(format!("invalid transient error code `{s}`: {e}")))
        })
        .collect()
}

fn home_dir() -> PathBuf {
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => PathBuf::from(home),
        None => {
            warn!("No home directory in environment, using the working directory");
            PathBuf::from(".")
        }
    }
}
