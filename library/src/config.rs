//! Configuration for the library panel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rover_directory_watcher::{PathPolicy, SeparatorStyle, TreeConfig};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::Result;

/// Configuration for the library panel.
///
/// Every field has a default, so a config file only needs the settings it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Separator convention for watched paths.
    pub separator: SeparatorStyle,

    /// How root trees are built.
    pub tree: TreeConfig,

    /// Watch-service synchronization.
    pub sync: SyncConfig,

    /// File backing the watch store.
    pub store_path: PathBuf,
}

impl LibraryConfig {
    /// Load a config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The path policy selected by `separator`.
    pub fn policy(&self) -> PathPolicy {
        PathPolicy::from_style(self.separator)
    }

    /// Set the store path.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Set the tree configuration.
    pub fn with_tree(mut self, tree: TreeConfig) -> Self {
        self.tree = tree;
        self
    }

    /// Set the separator convention.
    pub fn with_separator(mut self, separator: SeparatorStyle) -> Self {
        self.separator = separator;
        self
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            separator: SeparatorStyle::default(),
            tree: TreeConfig::default(),
            sync: SyncConfig::default(),
            store_path: dirs::data_dir()
                .unwrap_or_default()
                .join("rover/watched-directories.json"),
        }
    }
}

/// Configuration for watch-service synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between retries of unconfirmed changes (0 disables retrying).
    pub retry_interval_secs: u64,

    /// Seconds to wait for the watch service to answer one command
    /// (0 waits forever).
    pub command_timeout_secs: u64,

    /// Whether filesystem changes trigger tree rebuilds.
    pub rebuild_on_change: bool,
}

impl SyncConfig {
    /// Retry period, if retrying is enabled.
    pub fn retry_interval(&self) -> Option<Duration> {
        (self.retry_interval_secs > 0).then(|| Duration::from_secs(self.retry_interval_secs))
    }

    /// Per-command reply limit, if one is set.
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 30,
            command_timeout_secs: 30,
            rebuild_on_change: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LibraryError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = LibraryConfig::from_toml_str(
            r#"
            separator = "windows"

            [sync]
            retry_interval_secs = 0
            command_timeout_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.separator, SeparatorStyle::Windows);
        assert_eq!(config.sync.retry_interval(), None);
        assert_eq!(config.sync.command_timeout(), None);
        assert!(config.sync.rebuild_on_change);
        assert_eq!(config.tree, TreeConfig::default());
        assert!(config.store_path.ends_with("rover/watched-directories.json"));
    }

    #[test]
    fn test_default_sync_timings() {
        let sync = SyncConfig::default();
        assert_eq!(sync.retry_interval(), Some(Duration::from_secs(30)));
        assert_eq!(sync.command_timeout(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rover.toml");
        std::fs::write(
            &path,
            "store_path = \"/srv/rover/watched.json\"\n[tree]\nmax_depth = 3\n",
        )
        .unwrap();

        let config = LibraryConfig::load(&path).await.unwrap();

        assert_eq!(config.store_path, PathBuf::from("/srv/rover/watched.json"));
        assert_eq!(config.tree.max_depth, Some(3));
    }

    #[test]
    fn test_invalid_config() {
        let result = LibraryConfig::from_toml_str("separator = 42");

        assert!(matches!(result, Err(LibraryError::Config(_))));
    }
}
