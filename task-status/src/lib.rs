//! # Task Status
//!
//! Tracks background tasks by id and derives a busy/idle indicator from them.
//!
//! Task originators emit [`TaskEvent`]s, usually through a [`TaskReporter`];
//! a [`TaskStatusTracker`] consumes them and publishes each new status map.
//!
//! ```text
//! TaskReporter ──► TaskEvent channel ──► TaskStatusTracker ──► watch<Arc<TaskStatusMap>>
//!                                                                    │
//!                                                                    ▼
//!                                                                BusyState
//! ```

pub mod event;
pub mod reporter;
pub mod tracker;

pub use event::TaskEvent;
pub use reporter::{TaskGuard, TaskReporter};
pub use tracker::{BusyState, TaskStatusMap, TaskStatusTracker};
