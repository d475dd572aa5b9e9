//! Filesystem notifications for watched roots.

use std::path::Path;

use indexmap::IndexSet;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::event::{ChangeKind, DirectoryChange};

/// Forwards structural changes under watched roots to a channel.
///
/// Only changes that can alter a directory tree are forwarded: directories
/// appearing, entries disappearing, and renames.
pub struct ChangeNotifier {
    watcher: RecommendedWatcher,
    watched: IndexSet<String>,
}

impl ChangeNotifier {
    /// Create a notifier and the receiving end of its change channel.
    pub fn new(buffer: usize) -> Result<(Self, mpsc::Receiver<DirectoryChange>)> {
        let (tx, rx) = mpsc::channel(buffer);

        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(kind) = ChangeKind::from_event_kind(event.kind) else {
                        return;
                    };

                    for path in event.paths {
                        if kind == ChangeKind::Created && !path.is_dir() {
                            continue;
                        }

                        let change =
                            DirectoryChange::new(kind, path.to_string_lossy().into_owned());
                        if let Err(e) = tx.blocking_send(change) {
                            debug!("Dropping change, receiver closed: {e}");
                        }
                    }
                }
                Err(e) => {
                    error!("Watch error: {e}");
                }
            },
        )?;

        let notifier = Self {
            watcher,
            watched: IndexSet::new(),
        };
        Ok((notifier, rx))
    }

    /// Start receiving changes for everything under `root`.
    pub fn watch(&mut self, root: &str) -> Result<()> {
        if self.watched.contains(root) {
            return Ok(());
        }

        self.watcher.watch(Path::new(root), RecursiveMode::Recursive)?;
        self.watched.insert(root.to_string());
        info!("Watching for changes: {root}");
        Ok(())
    }

    /// Stop receiving changes for `root`.
    pub fn unwatch(&mut self, root: &str) -> Result<()> {
        if !self.watched.shift_remove(root) {
            return Ok(());
        }

        self.watcher.unwatch(Path::new(root))?;
        info!("Stopped watching for changes: {root}");
        Ok(())
    }

    /// Roots currently receiving notifications.
    pub fn watched(&self) -> Vec<String> {
        self.watched.iter().cloned().collect()
    }
}
