//! Configuration types for building directory trees.

use serde::{Deserialize, Serialize};
use wildmatch::WildMatch;

/// Default recursion limit for tree building.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Configuration for mirroring a watched root's subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Maximum depth to recurse below a root (None = unlimited).
    pub max_depth: Option<usize>,

    /// Directory names to leave out of the tree (wildcard patterns).
    pub exclude_patterns: Vec<String>,
}

impl TreeConfig {
    /// Create a config with default exclusions and depth limit.
    pub fn new() -> Self {
        Self {
            max_depth: Some(DEFAULT_MAX_DEPTH),
            exclude_patterns: Self::default_excludes(),
        }
    }

    /// Set the maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Remove the depth limit.
    pub fn unlimited_depth(mut self) -> Self {
        self.max_depth = None;
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Drop every exclude pattern, including the defaults.
    pub fn without_excludes(mut self) -> Self {
        self.exclude_patterns.clear();
        self
    }

    fn default_excludes() -> Vec<String> {
        vec![
            // Version control
            ".git".to_string(),
            ".svn".to_string(),
            ".hg".to_string(),
            // Dependencies and caches
            "node_modules".to_string(),
            "__pycache__".to_string(),
            // Trash folders
            ".Trash*".to_string(),
            "$RECYCLE.BIN".to_string(),
        ]
    }

    /// Check if a directory with this name should be left out.
    pub fn should_exclude(&self, name: &str) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| WildMatch::new(pattern).matches(name))
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tree_config_creation() {
        let config = TreeConfig::new().with_max_depth(3).exclude("cache");

        assert_eq!(config.max_depth, Some(3));
        assert!(config.exclude_patterns.contains(&"cache".to_string()));
    }

    #[test]
    fn test_exclude_patterns() {
        let config = TreeConfig::new();

        assert!(config.should_exclude(".git"));
        assert!(config.should_exclude(".Trash-1000"));
        assert!(config.should_exclude("node_modules"));
        assert!(!config.should_exclude("photos"));
        assert!(!TreeConfig::new().without_excludes().should_exclude(".git"));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: TreeConfig = serde_json::from_str(r#"{"max_depth": null}"#).unwrap();

        assert_eq!(config.max_depth, None);
        assert_eq!(config.exclude_patterns, TreeConfig::default().exclude_patterns);
    }
}
