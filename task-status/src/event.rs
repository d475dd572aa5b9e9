//! Task notifications as they arrive from task originators.

use serde::{Deserialize, Serialize};

/// A single task notification.
///
/// On the wire a status notification is `{"type": "task-status", "uuid": ..,
/// "status": ..}` and covers both start and progress; an end notification is
/// `{"type": "task-end", "uuid": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    /// The task started or reported progress.
    #[serde(rename = "task-status")]
    Status {
        #[serde(rename = "uuid")]
        task_id: String,
        status: String,
    },

    /// The task finished.
    #[serde(rename = "task-end")]
    End {
        #[serde(rename = "uuid")]
        task_id: String,
    },
}

impl TaskEvent {
    pub fn status(task_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self::Status {
            task_id: task_id.into(),
            status: status.into(),
        }
    }

    pub fn end(task_id: impl Into<String>) -> Self {
        Self::End {
            task_id: task_id.into(),
        }
    }

    /// The task this event concerns.
    pub fn task_id(&self) -> &str {
        match self {
            Self::Status { task_id, .. } | Self::End { task_id } => task_id,
        }
    }
}
