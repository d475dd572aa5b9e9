//! Emitting task notifications from the code doing the work.

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::event::TaskEvent;

/// Sends task notifications to a [`TaskStatusTracker`](crate::TaskStatusTracker).
#[derive(Debug, Clone)]
pub struct TaskReporter {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl TaskReporter {
    pub fn new(tx: mpsc::UnboundedSender<TaskEvent>) -> Self {
        Self { tx }
    }

    /// A reporter and the receiver to hand to [`TaskStatusTracker::run`](crate::TaskStatusTracker::run).
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Start a task with a fresh id. The task ends when the guard is dropped.
    pub fn begin(&self, status: impl Into<String>) -> TaskGuard {
        let id = Uuid::new_v4().to_string();
        self.send(TaskEvent::status(id.clone(), status));
        TaskGuard {
            id,
            reporter: self.clone(),
        }
    }

    fn send(&self, event: TaskEvent) {
        if self.tx.send(event).is_err() {
            debug!("Task tracker is gone, dropping task event");
        }
    }
}

/// An in-flight task.
#[derive(Debug)]
pub struct TaskGuard {
    id: String,
    reporter: TaskReporter,
}

impl TaskGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Report progress.
    pub fn update(&self, status: impl Into<String>) {
        self.reporter.send(TaskEvent::status(self.id.clone(), status));
    }

    /// End the task now.
    pub fn finish(self) {}
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.reporter.send(TaskEvent::end(self.id.clone()));
    }
}
