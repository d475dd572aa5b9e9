//! # Library Panel
//!
//! This crate wires the watched-directory components into the folder panel
//! of a reference library:
//!
//! - **Directory Watcher**: Overlap-free roots, trees, watch-service sync
//! - **Task Status**: Background scans and syncs behind a busy indicator
//! - **Watch Store**: A JSON file standing in for the persistence service
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Library Panel                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Watched    │  │     Sync     │  │     Task     │           │
//! │  │   Registry   │  │  Reconciler  │  │    Status    │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │         │                │                  │                   │
//! │         ▼                ▼                  ▼                   │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Search     │  │    Watch     │  │     Busy     │           │
//! │  │   Prefixes   │  │    Store     │  │    State     │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rover_library::{JsonWatchStore, LibraryPanel};
//!
//! let store = Arc::new(JsonWatchStore::open("watched.json").await?);
//! let panel = LibraryPanel::builder()
//!     .with_watch_service(store)
//!     .build()
//!     .await?;
//!
//! panel.add_directories(["/home/me/Music"]).await;
//! panel.select(["/home/me/Music/Jazz"]).await;
//! let prefixes = panel.search_prefixes().await;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod store;

pub use config::{LibraryConfig, SyncConfig};
pub use engine::{LibraryPanel, LibraryPanelBuilder, PanelStats};
pub use error::{LibraryError, Result};
pub use store::JsonWatchStore;

// Re-export from dependencies for convenience
pub use rover_directory_watcher::{
    AdmissionResult, ChangeNotifier, CollapsingProjector, DirectoryTreeNode, IdentityProjector,
    ReconcileReport, SelectionProjector,
};
pub use rover_task_status::{BusyState, TaskStatusMap};
