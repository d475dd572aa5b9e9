//! Structural change events from watched roots.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use serde::{Deserialize, Serialize};

/// A change that may alter the shape of a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryChange {
    /// The kind of change.
    pub kind: ChangeKind,

    /// Path of the affected entry.
    pub path: String,

    /// When the change was observed.
    pub timestamp: DateTime<Utc>,
}

impl DirectoryChange {
    /// Create a change observed now.
    pub fn new(kind: ChangeKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A directory appeared.
    Created,

    /// An entry disappeared.
    Removed,

    /// An entry was renamed (old path).
    RenamedFrom,

    /// An entry was renamed (new path).
    RenamedTo,

    /// An entry was renamed and the platform did not say which side this is.
    Renamed,
}

impl ChangeKind {
    /// Classify a raw notify event.
    ///
    /// Content, metadata and access events never change a tree and map to
    /// `None`, as do creations and removals the platform reports as files.
    pub fn from_event_kind(kind: notify::EventKind) -> Option<Self> {
        match kind {
            notify::EventKind::Create(CreateKind::File) => None,
            notify::EventKind::Create(_) => Some(Self::Created),
            notify::EventKind::Remove(RemoveKind::File) => None,
            notify::EventKind::Remove(_) => Some(Self::Removed),
            notify::EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => Some(Self::RenamedFrom),
                RenameMode::To => Some(Self::RenamedTo),
                _ => Some(Self::Renamed),
            },
            _ => None,
        }
    }
}

/// Changes gathered between two tree refreshes.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    /// Changes in arrival order.
    pub changes: Vec<DirectoryChange>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: DirectoryChange) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Affected paths, first occurrence order, without repeats.
    pub fn paths(&self) -> Vec<String> {
        self.changes
            .iter()
            .map(|c| c.path.clone())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}
