//! The task status map and its busy/idle aggregate.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::event::TaskEvent;

/// Active task ids and their status strings, in start order.
pub type TaskStatusMap = IndexMap<String, String>;

/// Tracks in-flight background tasks.
///
/// Every change replaces the map with a fresh `Arc`, so subscribers can tell
/// whether anything changed with [`Arc::ptr_eq`]. Events for unknown tasks
/// and duplicate starts are ignored rather than treated as errors.
pub struct TaskStatusTracker {
    statuses: Arc<TaskStatusMap>,
    tx: watch::Sender<Arc<TaskStatusMap>>,
}

impl TaskStatusTracker {
    pub fn new() -> Self {
        let statuses = Arc::new(TaskStatusMap::new());
        let (tx, _) = watch::channel(statuses.clone());
        Self { statuses, tx }
    }

    /// Begin tracking `task_id`. A task that is already active is left as is.
    pub fn start(&mut self, task_id: &str, status: &str) {
        if self.statuses.contains_key(task_id) {
            debug!("Ignoring duplicate start for task {task_id}");
            return;
        }
        self.update(|map| {
            map.insert(task_id.to_string(), status.to_string());
        });
    }

    /// Replace the status of an active task.
    pub fn progress(&mut self, task_id: &str, status: &str) {
        if !self.statuses.contains_key(task_id) {
            debug!("Ignoring progress for unknown task {task_id}");
            return;
        }
        self.update(|map| {
            map.insert(task_id.to_string(), status.to_string());
        });
    }

    /// Stop tracking `task_id`.
    pub fn end(&mut self, task_id: &str) {
        if !self.statuses.contains_key(task_id) {
            debug!("Ignoring end for unknown task {task_id}");
            return;
        }
        self.update(|map| {
            map.shift_remove(task_id);
        });
    }

    /// Apply a wire notification.
    ///
    /// A status notification starts the task if it is unknown and otherwise
    /// replaces its status.
    pub fn apply(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Status { task_id, status } => {
                if self.statuses.contains_key(&task_id) {
                    self.progress(&task_id, &status);
                } else {
                    self.start(&task_id, &status);
                }
            }
            TaskEvent::End { task_id } => self.end(&task_id),
        }
    }

    /// The current map.
    pub fn statuses(&self) -> Arc<TaskStatusMap> {
        self.statuses.clone()
    }

    pub fn status(&self, task_id: &str) -> Option<&str> {
        self.statuses.get(task_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Whether any task is active.
    pub fn is_busy(&self) -> bool {
        !self.statuses.is_empty()
    }

    /// Subscribe to map replacements.
    pub fn subscribe(&self) -> watch::Receiver<Arc<TaskStatusMap>> {
        self.tx.subscribe()
    }

    /// Apply events until every sender is dropped.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<TaskEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(event);
        }
        debug!("Task event channel closed");
    }

    fn update(&mut self, change: impl FnOnce(&mut TaskStatusMap)) {
        let mut next = TaskStatusMap::clone(&self.statuses);
        change(&mut next);
        self.statuses = Arc::new(next);
        self.tx.send_replace(self.statuses.clone());
    }
}

impl Default for TaskStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Status-bar aggregate of a [`TaskStatusMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusyState {
    Idle,
    Busy {
        /// Status of the most recently started task.
        latest: String,
        count: usize,
    },
}

impl BusyState {
    pub fn from_statuses(statuses: &TaskStatusMap) -> Self {
        match statuses.last() {
            None => Self::Idle,
            Some((_, status)) => Self::Busy {
                latest: status.clone(),
                count: statuses.len(),
            },
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl fmt::Display for BusyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Busy { latest, count: 1 } => f.write_str(latest),
            Self::Busy { latest, count } => write!(f, "{latest} (+{} more)", count - 1),
        }
    }
}
