//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::ServiceError;
use crate::service::{DirectoryEntry, DirectoryLister, WatchService};

/// A lister backed by a fixed map of listings.
#[derive(Default)]
pub struct MemoryLister {
    listings: HashMap<String, Result<Vec<DirectoryEntry>, String>>,
    canonical: HashMap<String, String>,
}

impl MemoryLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory whose entries are all subdirectories.
    pub fn dir(self, path: &str, children: &[&str]) -> Self {
        let entries = children
            .iter()
            .map(|name| DirectoryEntry::directory(*name))
            .collect();
        self.entries(path, entries)
    }

    pub fn entries(mut self, path: &str, entries: Vec<DirectoryEntry>) -> Self {
        self.listings.insert(path.to_string(), Ok(entries));
        self
    }

    pub fn unreadable(mut self, path: &str) -> Self {
        self.listings
            .insert(path.to_string(), Err(format!("permission denied: {path}")));
        self
    }

    pub fn canonical(mut self, path: &str, target: &str) -> Self {
        self.canonical.insert(path.to_string(), target.to_string());
        self
    }
}

#[async_trait]
impl DirectoryLister for MemoryLister {
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, ServiceError> {
        match self.listings.get(path) {
            Some(Ok(entries)) => Ok(entries.clone()),
            Some(Err(message)) => Err(ServiceError::Rejected(message.clone())),
            None => Err(ServiceError::Rejected(format!("no such directory: {path}"))),
        }
    }

    async fn canonicalize(&self, path: &str) -> Option<String> {
        self.canonical.get(path).cloned()
    }
}

/// Holds the next listing of one path until released.
pub struct GatedLister {
    inner: MemoryLister,
    gated: Mutex<Option<String>>,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl GatedLister {
    pub fn new(inner: MemoryLister, gated: &str) -> Self {
        let lister = Self::unarmed(inner);
        lister.arm(gated);
        lister
    }

    /// A lister that passes every listing through until [`Self::arm`].
    pub fn unarmed(inner: MemoryLister) -> Self {
        Self {
            inner,
            gated: Mutex::new(None),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    pub fn arm(&self, path: &str) {
        *self.gated.lock().unwrap() = Some(path.to_string());
    }
}

#[async_trait]
impl DirectoryLister for GatedLister {
    async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, ServiceError> {
        let hold = {
            let mut gated = self.gated.lock().unwrap();
            if gated.as_deref() == Some(path) {
                *gated = None;
                true
            } else {
                false
            }
        };
        if hold {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.list_directory(path).await
    }
}

/// A watch service that records calls and fails on demand.
#[derive(Default)]
pub struct ScriptedWatchService {
    watched: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    rejecting: Mutex<HashSet<String>>,
    unreachable: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    unavailable: Mutex<bool>,
    /// Notified when a command for a hanging path arrives.
    pub entered: Notify,
}

impl ScriptedWatchService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watched(paths: &[&str]) -> Self {
        let service = Self::default();
        *service.watched.lock().unwrap() = paths.iter().map(|p| p.to_string()).collect();
        service
    }

    /// Make every command for `path` fail until [`Self::accept`] is called.
    pub fn reject(&self, path: &str) {
        self.rejecting.lock().unwrap().insert(path.to_string());
    }

    pub fn accept(&self, path: &str) {
        self.rejecting.lock().unwrap().remove(path);
    }

    /// Fail commands for `path` as if the service could not be reached.
    pub fn unreachable(&self, path: &str) {
        self.unreachable.lock().unwrap().insert(path.to_string());
    }

    /// Never answer commands for `path` until [`Self::release`] is called.
    pub fn hang(&self, path: &str) {
        self.hanging.lock().unwrap().insert(path.to_string());
    }

    pub fn release(&self, path: &str) {
        self.hanging.lock().unwrap().remove(path);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    /// Calls so far, as `watch:<path>` / `unwatch:<path>`, sorted.
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn check(&self, op: &str, path: &str) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(format!("{op}:{path}"));
        let hanging = self.hanging.lock().unwrap().contains(path);
        if hanging {
            self.entered.notify_one();
            std::future::pending::<()>().await;
        }
        if *self.unavailable.lock().unwrap() || self.unreachable.lock().unwrap().contains(path) {
            return Err(ServiceError::Unavailable("connection refused".to_string()));
        }
        if self.rejecting.lock().unwrap().contains(path) {
            return Err(ServiceError::Rejected(format!("cannot {op} {path}")));
        }
        Ok(())
    }
}

#[async_trait]
impl WatchService for ScriptedWatchService {
    async fn watch(&self, path: &str) -> Result<(), ServiceError> {
        self.check("watch", path).await?;
        self.watched.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn unwatch(&self, path: &str) -> Result<(), ServiceError> {
        self.check("unwatch", path).await?;
        self.watched.lock().unwrap().retain(|p| p != path);
        Ok(())
    }

    async fn list_watched(&self) -> Result<Vec<String>, ServiceError> {
        if *self.unavailable.lock().unwrap() {
            return Err(ServiceError::Unavailable("connection refused".to_string()));
        }
        Ok(self.watched.lock().unwrap().clone())
    }
}
