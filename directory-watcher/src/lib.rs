//! # Directory Watcher
//!
//! This crate manages the set of directories a reference library watches.
//! It keeps the roots free of overlap, mirrors each root's subdirectories as
//! a tree, and converges an external watch service on the current roots.
//!
//! ## Features
//!
//! - **Overlap-free Roots**: A root never contains or lies within another
//! - **Tree Mirroring**: Subdirectory trees with partial-read diagnostics
//! - **Stale-result Suppression**: Late tree builds for removed roots are dropped
//! - **Watch-service Sync**: Diff-based, retried on the next pass when a command fails
//! - **Change Notifications**: Structural filesystem changes trigger rebuilds
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  PathPolicy ──► WatchedDirectoryRegistry ──► RegistryView      │
//! │                   │            │                 │              │
//! │                   ▼            ▼                 ▼              │
//! │  DirectoryLister ◄─ TreeBuilder  SyncReconciler  Projector      │
//! │                                    │                            │
//! │  ChangeNotifier ──► rebuild        ▼                            │
//! │                                WatchService                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod path;
pub mod reconciler;
pub mod registry;
pub mod selection;
pub mod service;
pub mod tree;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use config::{DEFAULT_MAX_DEPTH, TreeConfig};
pub use error::{Result, ServiceError, WatcherError};
pub use event::{ChangeBatch, ChangeKind, DirectoryChange};
pub use path::{PathPolicy, PathSet, SeparatorStyle};
pub use reconciler::{ReconcileReport, SyncDiff, SyncFailure, SyncOp, SyncReconciler};
pub use registry::{
    AdmissionResult, RebuildOutcome, RegistryView, Rejection, RejectionReason, WatchedRoot,
    WatchedDirectoryRegistry,
};
pub use selection::{CollapsingProjector, IdentityProjector, SelectionProjector};
pub use service::{DirectoryEntry, DirectoryLister, LocalDirectoryLister, WatchService};
pub use tree::{BuildDiagnostic, BuiltTree, DiagnosticKind, DirectoryTreeNode, TreeBuilder};
pub use watcher::ChangeNotifier;
