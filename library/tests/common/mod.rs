//! Shared fakes for the panel integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rover_directory_watcher::{DirectoryEntry, DirectoryLister, ServiceError, WatchService};
use rover_library::{LibraryConfig, LibraryPanel, SelectionProjector};
use tokio::sync::Notify;

/// An in-memory directory hierarchy that tests can change while a panel is
/// open.
#[derive(Default)]
pub struct FakeLister {
    dirs: Mutex<HashMap<String, Vec<String>>>,
    unreadable: Mutex<HashSet<String>>,
    gate: Mutex<Option<String>>,
    pub entered: Notify,
    pub release: Notify,
}

impl FakeLister {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create `path` with the given subdirectories.
    pub fn dir(&self, path: &str, children: &[&str]) -> &Self {
        self.dirs.lock().unwrap().insert(
            path.to_string(),
            children.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn remove_child(&self, parent: &str, name: &str) {
        if let Some(children) = self.dirs.lock().unwrap().get_mut(parent) {
            children.retain(|c| c != name);
        }
    }

    pub fn unreadable(&self, path: &str) -> &Self {
        self.unreadable.lock().unwrap().insert(path.to_string());
        self
    }

    /// Hold the next listing of `path` until `release` is notified.
    pub fn gate(&self, path: &str) {
        *self.gate.lock().unwrap() = Some(path.to_string());
    }
}

#[async_trait]
impl DirectoryLister for FakeLister {
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, ServiceError> {
        let gated = {
            let mut gate = self.gate.lock().unwrap();
            if gate.as_deref() == Some(path) {
                gate.take().is_some()
            } else {
                false
            }
        };
        if gated {
            self.entered.notify_one();
            self.release.notified().await;
        }

        if self.unreadable.lock().unwrap().contains(path) {
            return Err(ServiceError::Rejected(format!("permission denied: {path}")));
        }
        self.dirs
            .lock()
            .unwrap()
            .get(path)
            .map(|children| children.iter().map(DirectoryEntry::directory).collect())
            .ok_or_else(|| ServiceError::Rejected(format!("no such directory: {path}")))
    }
}

/// A watch service kept in memory, with switchable failures.
#[derive(Default)]
pub struct FakeWatchService {
    watched: Mutex<Vec<String>>,
    rejecting: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    down: Mutex<bool>,
    /// Notified when a command for a hanging path arrives.
    pub entered: Notify,
}

impl FakeWatchService {
    pub fn new(watched: &[&str]) -> Arc<Self> {
        let service = Self::default();
        *service.watched.lock().unwrap() = watched.iter().map(|p| p.to_string()).collect();
        Arc::new(service)
    }

    pub fn watched(&self) -> Vec<String> {
        let mut watched = self.watched.lock().unwrap().clone();
        watched.sort();
        watched
    }

    pub fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }

    pub fn reject(&self, path: &str) {
        self.rejecting.lock().unwrap().insert(path.to_string());
    }

    pub fn accept(&self, path: &str) {
        self.rejecting.lock().unwrap().remove(path);
    }

    /// Never answer commands for `path`.
    pub fn hang(&self, path: &str) {
        self.hanging.lock().unwrap().insert(path.to_string());
    }

    async fn check(&self, path: &str) -> Result<(), ServiceError> {
        let hanging = self.hanging.lock().unwrap().contains(path);
        if hanging {
            self.entered.notify_one();
            std::future::pending::<()>().await;
        }
        if *self.down.lock().unwrap() {
            return Err(ServiceError::Unavailable("connection refused".to_string()));
        }
        if self.rejecting.lock().unwrap().contains(path) {
            return Err(ServiceError::Rejected(format!("refused: {path}")));
        }
        Ok(())
    }
}

#[async_trait]
impl WatchService for FakeWatchService {
    async fn watch(&self, path: &str) -> Result<(), ServiceError> {
        self.check(path).await?;
        let mut watched = self.watched.lock().unwrap();
        if !watched.iter().any(|p| p == path) {
            watched.push(path.to_string());
        }
        Ok(())
    }

    async fn unwatch(&self, path: &str) -> Result<(), ServiceError> {
        self.check(path).await?;
        self.watched.lock().unwrap().retain(|p| p != path);
        Ok(())
    }

    async fn list_watched(&self) -> Result<Vec<String>, ServiceError> {
        if *self.down.lock().unwrap() {
            return Err(ServiceError::Unavailable("connection refused".to_string()));
        }
        Ok(self.watched.lock().unwrap().clone())
    }
}

/// A small music library:
///
/// ```text
/// /music
/// ├── jazz
/// │   └── bebop
/// └── rock
/// /photos
/// └── 2023
/// ```
pub fn music_library() -> Arc<FakeLister> {
    let lister = FakeLister::new();
    lister
        .dir("/music", &["jazz", "rock"])
        .dir("/music/jazz", &["bebop"])
        .dir("/music/jazz/bebop", &[])
        .dir("/music/rock", &[])
        .dir("/photos", &["2023"])
        .dir("/photos/2023", &[]);
    lister
}

pub fn unix_config() -> LibraryConfig {
    LibraryConfig::default().with_separator(rover_directory_watcher::SeparatorStyle::Unix)
}

pub async fn open_panel(
    lister: Arc<FakeLister>,
    service: Arc<FakeWatchService>,
    projector: Arc<dyn SelectionProjector>,
) -> LibraryPanel {
    LibraryPanel::builder()
        .with_config(unix_config())
        .with_lister(lister)
        .with_watch_service(service)
        .with_projector(projector)
        .build()
        .await
        .unwrap()
}
