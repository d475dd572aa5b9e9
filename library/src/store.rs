//! File-backed watch store.
//!
//! The `JsonWatchStore` keeps the watched roots in a single JSON file and
//! rewrites it atomically after every confirmed change.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexSet;
use rover_directory_watcher::{ServiceError, WatchService};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    watched: Vec<String>,
}

/// A [`WatchService`] persisted to a JSON file.
pub struct JsonWatchStore {
    path: PathBuf,
    watched: Mutex<IndexSet<String>>,
}

impl JsonWatchStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let watched = match fs::read_to_string(&path).await {
            Ok(content) => {
                let file: StoreFile = serde_json::from_str(&content)?;
                file.watched.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexSet::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Opened watch store {} ({} directories)",
            path.display(),
            watched.len()
        );
        Ok(Self {
            path,
            watched: Mutex::new(watched),
        })
    }

    /// File backing the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, watched: &IndexSet<String>) -> std::result::Result<(), ServiceError> {
        let unavailable = |e: &dyn std::fmt::Display| {
            ServiceError::Unavailable(format!("{}: {e}", self.path.display()))
        };

        let file = StoreFile {
            watched: watched.iter().cloned().collect(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|e| unavailable(&e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable(&e))?;
        }

        // Write atomically using a temp file
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .await
            .map_err(|e| unavailable(&e))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| unavailable(&e))?;

        debug!("Saved watch store: {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl WatchService for JsonWatchStore {
    async fn watch(&self, path: &str) -> std::result::Result<(), ServiceError> {
        let mut watched = self.watched.lock().await;
        if watched.contains(path) {
            return Ok(());
        }

        let mut next = watched.clone();
        next.insert(path.to_string());
        self.save(&next).await?;
        *watched = next;
        Ok(())
    }

    async fn unwatch(&self, path: &str) -> std::result::Result<(), ServiceError> {
        let mut watched = self.watched.lock().await;
        if !watched.contains(path) {
            return Ok(());
        }

        let mut next = watched.clone();
        next.shift_remove(path);
        self.save(&next).await?;
        *watched = next;
        Ok(())
    }

    async fn list_watched(&self) -> std::result::Result<Vec<String>, ServiceError> {
        Ok(self.watched.lock().await.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_changes_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state/watched.json");

        let store = JsonWatchStore::open(&path).await.unwrap();
        assert!(store.list_watched().await.unwrap().is_empty());
        store.watch("/music").await.unwrap();
        store.watch("/photos").await.unwrap();
        store.watch("/music").await.unwrap();
        store.unwatch("/photos").await.unwrap();
        store.unwatch("/never").await.unwrap();

        let reopened = JsonWatchStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_watched().await.unwrap(), vec!["/music"]);
        assert!(!temp_dir.path().join("state/watched.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_store_fails_to_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watched.json");
        std::fs::write(&path, "not json").unwrap();

        let result = JsonWatchStore::open(&path).await;

        assert!(matches!(result, Err(LibraryError::Json(_))));
    }

    #[tokio::test]
    async fn test_unwritable_store_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonWatchStore::open(temp_dir.path().join("state/watched.json"))
            .await
            .unwrap();
        std::fs::write(temp_dir.path().join("state"), "").unwrap();

        let result = store.watch("/music").await;

        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
        assert!(store.list_watched().await.unwrap().is_empty());
    }
}
