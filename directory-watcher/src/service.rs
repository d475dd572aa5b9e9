//! Contracts for the external collaborators this crate drives.
//!
//! The listing service feeds [`TreeBuilder`](crate::tree::TreeBuilder) and the
//! watch service is the durable source of truth that
//! [`SyncReconciler`](crate::reconciler::SyncReconciler) converges on.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::ServiceError;

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name, without any parent path.
    pub name: String,

    /// Whether the entry is itself a directory.
    pub is_directory: bool,
}

impl DirectoryEntry {
    /// A directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
        }
    }

    /// A non-directory entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
        }
    }
}

/// Lists the immediate contents of a directory.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// List `path`, in the order the filesystem reports entries.
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, ServiceError>;

    /// Identity of `path` for cycle detection.
    ///
    /// Listers that can resolve symbolic links return the resolved path;
    /// `None` means the path is its own identity.
    async fn canonicalize(&self, _path: &str) -> Option<String> {
        None
    }
}

/// Durable registration of watched roots.
#[async_trait]
pub trait WatchService: Send + Sync {
    /// Start watching `path`.
    async fn watch(&self, path: &str) -> Result<(), ServiceError>;

    /// Stop watching `path`.
    async fn unwatch(&self, path: &str) -> Result<(), ServiceError>;

    /// Every path currently registered.
    async fn list_watched(&self) -> Result<Vec<String>, ServiceError>;
}

/// Lists directories on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalDirectoryLister {
    follow_symlinks: bool,
}

impl LocalDirectoryLister {
    /// Create a lister that reports symbolic links as non-directories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report symbolic links to directories as directories.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    async fn is_directory(&self, entry: &fs::DirEntry) -> bool {
        if self.follow_symlinks {
            matches!(fs::metadata(entry.path()).await, Ok(m) if m.is_dir())
        } else {
            matches!(entry.file_type().await, Ok(t) if t.is_dir())
        }
    }
}

#[async_trait]
impl DirectoryLister for LocalDirectoryLister {
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, ServiceError> {
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| ServiceError::Rejected(format!("{path}: {e}")))?;

        let mut listing = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ServiceError::Rejected(format!("{path}: {e}")))?
        {
            listing.push(DirectoryEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: self.is_directory(&entry).await,
            });
        }

        debug!("Listed {} entries in {path}", listing.len());
        Ok(listing)
    }

    async fn canonicalize(&self, path: &str) -> Option<String> {
        fs::canonicalize(Path::new(path))
            .await
            .ok()
            .map(|p| p.to_string_lossy().into_owned())
    }
}
