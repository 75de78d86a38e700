//! Best-effort removal of packaged-media fragments left by the engine.
//!
//! A failed or suspended job cannot be resumed with its partial bytes, so a
//! title may accumulate several packages over time. They are only found again
//! by name: any entry below the artifact directory whose relative path
//! contains the percent-encoded title and carries the package extension.

use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, info, warn};

/// Characters allowed unescaped in a URL path: alphanumerics plus
/// `!$&'()*+,-./:;=@_~`.
const URL_PATH_ALLOWED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'-')
    .remove(b'.')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a title the way package names embed it.
pub fn encoded_title(title: &str) -> String {
    utf8_percent_encode(title, URL_PATH_ALLOWED).to_string()
}

/// Collect package paths under `root` that belong to `title`.
///
/// Matching packages are not descended into.
pub async fn find_artifacts(root: &Path, title: &str, extension: &str) -> Vec<PathBuf> {
    let needle = encoded_title(title);
    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy();
            if relative.contains(needle.as_str()) && relative.ends_with(suffix.as_str()) {
                found.push(path);
                continue;
            }
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                pending.push(path);
            }
        }
    }

    found
}

/// Delete every package for `title`. Errors are logged and ignored.
///
/// Returns the number of entries removed.
pub async fn remove_artifacts(root: &Path, title: &str, extension: &str) -> usize {
    let candidates = find_artifacts(root, title, extension).await;
    if candidates.is_empty() {
        return 0;
    }

    let mut removed = 0;
    for path in candidates {
        let result = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove artifact"),
        }
    }

    info!(title = %title, removed, "Removed downloaded artifacts");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_title() {
        assert_eq!(encoded_title("plain"), "plain");
        assert_eq!(encoded_title("two words"), "two%20words");
        assert_eq!(encoded_title("第一集"), "%E7%AC%AC%E4%B8%80%E9%9B%86");
        assert_eq!(encoded_title("Show (2020)"), "Show%20(2020)");
        assert_eq!(encoded_title("Tom & Jerry: S01"), "Tom%20&%20Jerry:%20S01");
        assert_eq!(encoded_title("100% #1?"), "100%25%20%231%3F");
    }

    #[tokio::test]
    async fn test_removes_packages_with_reserved_characters() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("com.example.app");
        tokio::fs::create_dir_all(cache.join("Show%20(2020)_1.movpkg"))
            .await
            .unwrap();
        tokio::fs::create_dir_all(cache.join("Tom%20&%20Jerry:%20S01_1.movpkg"))
            .await
            .unwrap();

        assert_eq!(remove_artifacts(dir.path(), "Show (2020)", "movpkg").await, 1);
        assert!(!cache.join("Show%20(2020)_1.movpkg").exists());
        assert!(cache.join("Tom%20&%20Jerry:%20S01_1.movpkg").exists());

        assert_eq!(remove_artifacts(dir.path(), "Tom & Jerry: S01", "movpkg").await, 1);
        assert!(!cache.join("Tom%20&%20Jerry:%20S01_1.movpkg").exists());
    }

    #[tokio::test]
    async fn test_removes_matching_packages_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let cache = root.join("com.example.app");
        tokio::fs::create_dir_all(cache.join("My%20Show_1.movpkg/Data"))
            .await
            .unwrap();
        tokio::fs::write(cache.join("My%20Show_1.movpkg/Data/seg0.ts"), b"x")
            .await
            .unwrap();
        tokio::fs::create_dir_all(cache.join("My%20Show_2.movpkg"))
            .await
            .unwrap();
        tokio::fs::create_dir_all(cache.join("Other_1.movpkg"))
            .await
            .unwrap();
        tokio::fs::write(cache.join("My%20Show.json"), b"{}")
            .await
            .unwrap();

        let removed = remove_artifacts(root, "My Show", "movpkg").await;
        assert_eq!(removed, 2);
        assert!(!cache.join("My%20Show_1.movpkg").exists());
        assert!(!cache.join("My%20Show_2.movpkg").exists());
        assert!(cache.join("Other_1.movpkg").exists());
        assert!(cache.join("My%20Show.json").exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let removed = remove_artifacts(&dir.path().join("absent"), "A", ".movpkg").await;
        assert_eq!(removed, 0);
    }
}
