//! Local workshop content cache lookup
//!
//! Steam keeps downloaded workshop items under
//! `<library>/steamapps/workshop/content/<app>/<id>`. The locator only reads
//! that layout; library discovery is the caller's job (`download.library_roots`).

use crate::types::{AppId, PublishedFileId};
use std::path::{Path, PathBuf};

/// A cached item directory and the scope it was found under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheHit {
    /// Scope directory the item was found in
    pub app_id: AppId,
    /// The item's content directory
    pub content_dir: PathBuf,
}

/// Searches caller-supplied library roots for cached workshop content
#[derive(Clone, Debug, Default)]
pub struct CacheLocator {
    roots: Vec<PathBuf>,
}

/// `<root>/steamapps/workshop/content`
pub fn content_root(library_root: &Path) -> PathBuf {
    library_root
        .join("steamapps")
        .join("workshop")
        .join("content")
}

impl CacheLocator {
    /// Create a locator over `roots`, searched in order
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// The library roots being searched
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Look for the item under one scope
    pub async fn find(&self, app_id: AppId, published_file_id: PublishedFileId) -> Option<CacheHit> {
        if app_id.is_unset() {
            return None;
        }
        for root in &self.roots {
            if let Some(hit) = find_in_root(root, app_id, published_file_id).await {
                return Some(hit);
            }
        }
        None
    }

    /// Look for the item under every numeric scope directory
    pub async fn find_any_app(&self, published_file_id: PublishedFileId) -> Option<CacheHit> {
        for root in &self.roots {
            if let Some(hit) = scan_root(root, published_file_id).await {
                return Some(hit);
            }
        }
        None
    }
}

/// Find an item below a single library root
pub async fn find_in_root(
    library_root: &Path,
    app_id: AppId,
    published_file_id: PublishedFileId,
) -> Option<CacheHit> {
    let candidate = content_root(library_root)
        .join(app_id.to_string())
        .join(published_file_id.to_string());
    is_populated_dir(&candidate).await.then(|| CacheHit {
        app_id,
        content_dir: candidate,
    })
}

async fn scan_root(library_root: &Path, published_file_id: PublishedFileId) -> Option<CacheHit> {
    let content_root = content_root(library_root);
    let mut read_dir = match tokio::fs::read_dir(&content_root).await {
        Ok(read_dir) => read_dir,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = ?content_root, error = %e, "cannot enumerate workshop content");
            }
            return None;
        }
    };

    let mut app_dirs = Vec::new();
    while let Ok(Some(entry)) = read_dir.next_entry().await {
        let app_id = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
            .filter(|id| *id != 0);
        if let Some(app_id) = app_id {
            app_dirs.push((AppId(app_id), entry.path()));
        }
    }
    app_dirs.sort();

    for (app_id, app_dir) in app_dirs {
        let candidate = app_dir.join(published_file_id.to_string());
        if is_populated_dir(&candidate).await {
            return Some(CacheHit {
                app_id,
                content_dir: candidate,
            });
        }
    }
    None
}

/// A directory with at least one entry; empty item folders are leftovers of failed downloads
async fn is_populated_dir(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn seed(root: &Path, app: &str, id: &str) -> PathBuf {
        let dir = content_root(root).join(app).join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("item.gma"), "GMAD").unwrap();
        dir
    }

    #[tokio::test]
    async fn finds_item_under_exact_scope() {
        let library = TempDir::new().unwrap();
        let dir = seed(library.path(), "4000", "123456");

        let locator = CacheLocator::new(vec![library.path().to_path_buf()]);
        let hit = locator.find(AppId(4000), PublishedFileId(123456)).await.unwrap();
        assert_eq!(hit.app_id, AppId(4000));
        assert_eq!(hit.content_dir, dir);

        assert!(locator.find(AppId(4001), PublishedFileId(123456)).await.is_none());
        assert!(locator.find(AppId(0), PublishedFileId(123456)).await.is_none());
    }

    #[tokio::test]
    async fn later_roots_are_searched() {
        let empty = TempDir::new().unwrap();
        let library = TempDir::new().unwrap();
        seed(library.path(), "4000", "77");

        let locator = CacheLocator::new(vec![
            empty.path().to_path_buf(),
            library.path().to_path_buf(),
        ]);
        assert!(locator.find(AppId(4000), PublishedFileId(77)).await.is_some());
    }

    #[tokio::test]
    async fn any_app_scan_skips_non_numeric_and_zero_scopes() {
        let library = TempDir::new().unwrap();
        seed(library.path(), "0", "55");
        seed(library.path(), "backup", "55");
        let dir = seed(library.path(), "730", "55");

        let locator = CacheLocator::new(vec![library.path().to_path_buf()]);
        let hit = locator.find_any_app(PublishedFileId(55)).await.unwrap();
        assert_eq!(hit.app_id, AppId(730));
        assert_eq!(hit.content_dir, dir);
    }

    #[tokio::test]
    async fn files_are_not_hits() {
        let library = TempDir::new().unwrap();
        let scope = content_root(library.path()).join("4000");
        fs::create_dir_all(&scope).unwrap();
        fs::write(scope.join("99"), "not a directory").unwrap();

        let locator = CacheLocator::new(vec![library.path().to_path_buf()]);
        assert!(locator.find(AppId(4000), PublishedFileId(99)).await.is_none());
        assert!(locator.find_any_app(PublishedFileId(99)).await.is_none());
    }

    #[tokio::test]
    async fn empty_item_folders_are_not_hits() {
        let library = TempDir::new().unwrap();
        let empty = content_root(library.path()).join("4000/31");
        fs::create_dir_all(&empty).unwrap();
        let populated = seed(library.path(), "4020", "31");

        let locator = CacheLocator::new(vec![library.path().to_path_buf()]);
        assert!(locator.find(AppId(4000), PublishedFileId(31)).await.is_none());
        assert!(find_in_root(library.path(), AppId(4000), PublishedFileId(31)).await.is_none());

        let hit = locator.find_any_app(PublishedFileId(31)).await.unwrap();
        assert_eq!(hit.app_id, AppId(4020));
        assert_eq!(hit.content_dir, populated);
    }

    #[tokio::test]
    async fn missing_roots_are_ignored() {
        let locator = CacheLocator::new(vec![PathBuf::from("/definitely/not/a/library")]);
        assert!(locator.find_any_app(PublishedFileId(1)).await.is_none());
    }
}
