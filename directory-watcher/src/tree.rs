//! Directory trees mirroring a watched root on disk.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TreeConfig;
use crate::error::{Result, WatcherError};
use crate::path::PathPolicy;
use crate::service::{DirectoryEntry, DirectoryLister};

/// One directory in a mirrored tree.
///
/// `id` is the directory's full path and doubles as its unique key.
/// Children appear in the order the listing service reported them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTreeNode {
    /// Full path of the directory.
    pub id: String,

    /// The directory's own name.
    pub label: String,

    /// Subdirectories.
    pub children: Vec<DirectoryTreeNode>,
}

impl DirectoryTreeNode {
    /// A node with no children.
    pub fn leaf(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            children: Vec::new(),
        }
    }

    /// Find the node with the given id in this subtree.
    pub fn find(&self, id: &str) -> Option<&DirectoryTreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Whether this subtree contains a node with the given id.
    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// All ids in this subtree, parents before children.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            ids.push(node.id.as_str());
            stack.extend(node.children.iter().rev());
        }
        ids
    }

    /// Number of nodes in this subtree, itself included.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(DirectoryTreeNode::node_count)
            .sum::<usize>()
    }
}

/// A non-fatal problem met while building a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDiagnostic {
    /// Directory the problem concerns.
    pub path: String,

    /// What happened.
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

/// Kind of build diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The subdirectory could not be listed and was left out.
    Unreadable { message: String },

    /// The subdirectory resolves to a directory already in this build.
    CycleSkipped { target: String },

    /// The subdirectory lies deeper than the configured limit.
    DepthLimit { max_depth: usize },
}

impl fmt::Display for BuildDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::Unreadable { message } => {
                write!(f, "{}: unreadable: {message}", self.path)
            }
            DiagnosticKind::CycleSkipped { target } => {
                write!(f, "{}: skipped, already visited as {target}", self.path)
            }
            DiagnosticKind::DepthLimit { max_depth } => {
                write!(f, "{}: skipped, deeper than {max_depth} levels", self.path)
            }
        }
    }
}

/// A successfully built tree together with its diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltTree {
    /// The root node.
    pub root: DirectoryTreeNode,

    /// Subdirectories skipped along the way.
    pub diagnostics: Vec<BuildDiagnostic>,
}

/// Per-build bookkeeping.
#[derive(Default)]
struct BuildState {
    visited: HashSet<String>,
    diagnostics: Vec<BuildDiagnostic>,
}

/// Builds [`DirectoryTreeNode`]s by walking a [`DirectoryLister`].
#[derive(Clone)]
pub struct TreeBuilder {
    lister: Arc<dyn DirectoryLister>,
    policy: PathPolicy,
    config: TreeConfig,
}

impl TreeBuilder {
    /// Create a builder.
    pub fn new(lister: Arc<dyn DirectoryLister>, policy: PathPolicy, config: TreeConfig) -> Self {
        Self {
            lister,
            policy,
            config,
        }
    }

    /// The path policy ids are normalized with.
    pub fn policy(&self) -> PathPolicy {
        self.policy
    }

    /// Build the tree rooted at `root`.
    ///
    /// Fails only if `root` itself cannot be listed. Subdirectories that
    /// cannot be listed are left out and reported as diagnostics.
    pub async fn build(&self, root: &str) -> Result<BuiltTree> {
        let root = self.policy.normalize(root);
        let entries =
            self.lister
                .list_directory(&root)
                .await
                .map_err(|e| WatcherError::Unreadable {
                    path: root.clone(),
                    message: e.to_string(),
                })?;

        let mut state = BuildState::default();
        state.visited.insert(self.identity(&root).await);

        let children = self.expand(&root, entries, 1, &mut state).await;
        let node = DirectoryTreeNode {
            label: self.policy.basename(&root).to_string(),
            id: root,
            children,
        };

        info!(
            "Built tree for {} ({} directories, {} diagnostics)",
            node.id,
            node.node_count(),
            state.diagnostics.len()
        );

        Ok(BuiltTree {
            root: node,
            diagnostics: state.diagnostics,
        })
    }

    async fn identity(&self, path: &str) -> String {
        self.lister
            .canonicalize(path)
            .await
            .unwrap_or_else(|| path.to_string())
    }

    fn expand<'a>(
        &'a self,
        parent: &'a str,
        entries: Vec<DirectoryEntry>,
        depth: usize,
        state: &'a mut BuildState,
    ) -> BoxFuture<'a, Vec<DirectoryTreeNode>> {
        async move {
            let mut children = Vec::new();

            for entry in entries {
                if !entry.is_directory || self.config.should_exclude(&entry.name) {
                    continue;
                }

                let path = self.policy.join(parent, &entry.name);

                if let Some(max_depth) = self.config.max_depth {
                    if depth > max_depth {
                        debug!("Depth limit reached at {path}");
                        state.diagnostics.push(BuildDiagnostic {
                            path,
                            kind: DiagnosticKind::DepthLimit { max_depth },
                        });
                        continue;
                    }
                }

                let identity = self.identity(&path).await;
                if !state.visited.insert(identity.clone()) {
                    warn!("Skipping {path}: already visited as {identity}");
                    state.diagnostics.push(BuildDiagnostic {
                        path,
                        kind: DiagnosticKind::CycleSkipped { target: identity },
                    });
                    continue;
                }

                match self.lister.list_directory(&path).await {
                    Ok(grandchildren) => {
                        let subtree = self.expand(&path, grandchildren, depth + 1, state).await;
                        children.push(DirectoryTreeNode {
                            id: path,
                            label: entry.name,
                            children: subtree,
                        });
                    }
                    Err(e) => {
                        warn!("Skipping unreadable directory {path}: {e}");
                        state.diagnostics.push(BuildDiagnostic {
                            path,
                            kind: DiagnosticKind::Unreadable {
                                message: e.to_string(),
                            },
                        });
                    }
                }
            }

            children
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::LocalDirectoryLister;
    use crate::testing::MemoryLister;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn builder(lister: MemoryLister, config: TreeConfig) -> TreeBuilder {
        TreeBuilder::new(Arc::new(lister), PathPolicy::unix(), config)
    }

    #[tokio::test]
    async fn test_unreadable_subdirectory_is_skipped() {
        let lister = MemoryLister::new()
            .dir("/root", &["x", "y"])
            .dir("/root/x", &[])
            .unreadable("/root/y");

        let built = builder(lister, TreeConfig::new()).build("/root").await.unwrap();

        assert_eq!(built.root.id, "/root");
        assert_eq!(built.root.label, "root");
        assert_eq!(built.root.children, vec![DirectoryTreeNode::leaf("/root/x", "x")]);
        assert_eq!(built.diagnostics.len(), 1);
        assert_eq!(built.diagnostics[0].path, "/root/y");
        assert!(matches!(
            built.diagnostics[0].kind,
            DiagnosticKind::Unreadable { .. }
        ));
    }

    #[tokio::test]
    async fn test_unreadable_root_fails() {
        let lister = MemoryLister::new().unreadable("/root");

        let result = builder(lister, TreeConfig::new()).build("/root").await;

        assert!(matches!(result, Err(WatcherError::Unreadable { path, .. }) if path == "/root"));
    }

    #[tokio::test]
    async fn test_children_keep_listing_order_and_skip_files() {
        let lister = MemoryLister::new()
            .entries(
                "/root",
                vec![
                    DirectoryEntry::directory("b"),
                    DirectoryEntry::file("cover.png"),
                    DirectoryEntry::directory("a"),
                ],
            )
            .dir("/root/b", &["deep"])
            .dir("/root/b/deep", &[])
            .dir("/root/a", &[]);

        let built = builder(lister, TreeConfig::new()).build("/root/").await.unwrap();

        let labels: Vec<_> = built.root.children.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a"]);
        assert_eq!(
            built.root.ids(),
            vec!["/root", "/root/b", "/root/b/deep", "/root/a"]
        );
        assert!(built.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let lister = MemoryLister::new()
            .dir("/root", &["one"])
            .dir("/root/one", &["two"])
            .dir("/root/one/two", &[]);

        let built = builder(lister, TreeConfig::new().with_max_depth(1))
            .build("/root")
            .await
            .unwrap();

        assert_eq!(built.root.node_count(), 2);
        assert_eq!(
            built.diagnostics,
            vec![BuildDiagnostic {
                path: "/root/one/two".to_string(),
                kind: DiagnosticKind::DepthLimit { max_depth: 1 },
            }]
        );
    }

    #[tokio::test]
    async fn test_symlink_cycle_is_skipped() {
        let lister = MemoryLister::new()
            .dir("/root", &["loop", "real"])
            .dir("/root/real", &[])
            .dir("/root/loop", &[])
            .canonical("/root/loop", "/root");

        let built = builder(lister, TreeConfig::new()).build("/root").await.unwrap();

        assert_eq!(built.root.children, vec![DirectoryTreeNode::leaf("/root/real", "real")]);
        assert_eq!(
            built.diagnostics[0].kind,
            DiagnosticKind::CycleSkipped {
                target: "/root".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_excluded_directories_are_silent() {
        let lister = MemoryLister::new()
            .dir("/root", &[".git", "photos"])
            .dir("/root/.git", &[])
            .dir("/root/photos", &[]);

        let built = builder(lister, TreeConfig::new()).build("/root").await.unwrap();

        assert_eq!(built.root.children.len(), 1);
        assert!(built.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_build_from_local_filesystem() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("2023/summer")).unwrap();
        std::fs::File::create(temp_dir.path().join("2023/cover.png")).unwrap();

        let root = temp_dir.path().to_string_lossy().into_owned();
        let builder = TreeBuilder::new(
            Arc::new(LocalDirectoryLister::new()),
            PathPolicy::native(),
            TreeConfig::new(),
        );
        let built = builder.build(&root).await.unwrap();

        assert_eq!(built.root.node_count(), 3);
        let summer = PathPolicy::native().join(&PathPolicy::native().join(&root, "2023"), "summer");
        assert!(built.root.contains(&summer));
    }
}
