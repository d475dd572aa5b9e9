//! Error types for the directory watcher.

use std::time::Duration;

use thiserror::Error;

use crate::reconciler::ReconcileReport;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the directory watcher.
///
/// Per-path outcomes (overlap rejections, partial reads, individual sync
/// command failures) are not errors; they are carried in the structured
/// results of the operation that produced them.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The initial listing of a root directory failed.
    #[error("directory could not be listed: {path}: {message}")]
    Unreadable { path: String, message: String },

    /// An external collaborator could not be reached at all.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The watch service went away part way through a sync pass.
    ///
    /// `report` holds what the pass confirmed and refused before that.
    #[error("sync interrupted: {message}")]
    SyncInterrupted {
        message: String,
        report: Box<ReconcileReport>,
    },

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

impl WatcherError {
    /// The partial report of an interrupted sync pass.
    pub fn partial_report(&self) -> Option<&ReconcileReport> {
        match self {
            Self::SyncInterrupted { report, .. } => Some(&**report),
            _ => None,
        }
    }
}

/// Failure reported by an external collaborator for a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request reached the service and was refused.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The service itself is unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service did not answer in time.
    #[error("no reply within {0:?}")]
    TimedOut(Duration),
}

impl ServiceError {
    /// Whether this failure means the service as a whole is down.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<ServiceError> for WatcherError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Rejected(message) | ServiceError::Unavailable(message) => {
                Self::ServiceUnavailable(message)
            }
            ServiceError::TimedOut(_) => Self::ServiceUnavailable(err.to_string()),
        }
    }
}
