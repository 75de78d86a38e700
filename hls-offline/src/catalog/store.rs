//! Catalog persistence.
//!
//! The store is deliberately dumb: it reads and writes the whole catalog as a
//! single JSON array. Read-modify-write happens in the manager, which is the
//! only writer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::Catalog;
use crate::config::ManagerConfig;
use crate::utils::fs;
use crate::{Error, Result};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Read the full catalog.
    ///
    /// Returns `Error::CatalogNotFound` when nothing was persisted yet and
    /// `Error::Decode` when the document is unreadable.
    async fn load(&self) -> Result<Catalog>;

    /// Replace the persisted catalog.
    async fn save(&self, catalog: &Catalog) -> Result<()>;
}

/// Stores the catalog as `<root>/<file_name>`.
#[derive(Debug, Clone)]
pub struct JsonCatalogStore {
    root: PathBuf,
    path: PathBuf,
}

impl JsonCatalogStore {
    pub fn new(root: impl Into<PathBuf>, file_name: &str) -> Self {
        let root = root.into();
        let path = root.join(file_name);
        Self { root, path }
    }

    /// Store at the configured catalog location.
    pub fn from_config(config: &ManagerConfig) -> Self {
        let path = config.catalog_path();
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.data_dir.clone());
        Self { root, path }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the root directory on first use.
    ///
    /// The directory stays eligible for backups; platforms with a
    /// backup-exclusion attribute leave it unset.
    async fn ensure_root(&self) -> Result<()> {
        if fs::is_dir(&self.root).await {
            return Ok(());
        }
        fs::create_dir_all("creating catalog directory", &self.root).await?;
        debug!(root = %self.root.display(), "Created catalog directory");
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for JsonCatalogStore {
    async fn load(&self) -> Result<Catalog> {
        self.ensure_root().await?;
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CatalogNotFound {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(Error::io_path("reading catalog", &self.path, e)),
        };
        let catalog: Catalog = serde_json::from_slice(&bytes)?;
        trace!(path = %self.path.display(), records = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    async fn save(&self, catalog: &Catalog) -> Result<()> {
        self.ensure_root().await?;
        let bytes = serde_json::to_vec(catalog)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| Error::io_path("writing catalog", &self.path, e))?;
        trace!(path = %self.path.display(), records = catalog.len(), "Saved catalog");
        Ok(())
    }
}
