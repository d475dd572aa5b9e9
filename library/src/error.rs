//! Error types for the library panel.

use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, LibraryError>;

/// Errors that can occur in the library panel.
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Directory watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] rover_directory_watcher::WatcherError),

    /// Configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Watch store contents could not be parsed or written.
    #[error("store format error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required component was not supplied to the builder.
    #[error("panel not configured: {0}")]
    Builder(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
