//! Directory helpers that attach the operation and path to IO errors.

use std::path::Path;

use crate::{Error, Result};

/// Create `path` and its parents, labelling failures with `op`.
pub async fn create_dir_all(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::io_path(op, path, e))
}

/// Blocking variant of [`create_dir_all`] for use before the runtime starts.
pub fn create_dir_all_sync(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io_path(op, path, e))
}

/// Whether `path` is an existing directory. Unreadable metadata counts as no.
pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_dir_all_nested() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        assert!(!is_dir(&target).await);
        create_dir_all("creating catalog directory", &target)
            .await
            .unwrap();
        assert!(is_dir(&target).await);
    }

    #[tokio::test]
    async fn test_error_names_operation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        tokio::fs::write(&file, b"x").await.unwrap();
        assert!(!is_dir(&file).await);

        let err = create_dir_all("creating catalog directory", &file.join("sub"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { op: "creating catalog directory", .. }));
    }

    #[test]
    fn test_sync_variant_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("logs");
        create_dir_all_sync("creating log directory", &target).unwrap();
        create_dir_all_sync("creating log directory", &target).unwrap();
        assert!(target.is_dir());
    }
}
