//! The set of watched roots and their mirrored trees.
//!
//! Admission runs in three phases so that a slow tree build never holds the
//! registry lock:
//!
//! 1. Under the lock, candidates are checked against the current roots and
//!    every in-flight admission, and the survivors are reserved with a fresh
//!    generation number.
//! 2. Trees are built without the lock.
//! 3. Under the lock again, each build result is committed only if its
//!    reservation is still current. A `remove` issued in the meantime drops the
//!    reservation, so the late result is discarded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::path::{PathPolicy, PathSet};
use crate::tree::{BuildDiagnostic, DirectoryTreeNode, TreeBuilder};

/// A watched root with its current tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedRoot {
    /// Mirrored subtree.
    pub tree: DirectoryTreeNode,

    /// Problems met during the last build of `tree`.
    pub diagnostics: Vec<BuildDiagnostic>,
}

/// Why a candidate root was not admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RejectionReason {
    /// The candidate equals, contains, or lies within `conflicting`.
    OverlapsExisting { conflicting: String },

    /// The candidate's own listing failed.
    Unreadable { message: String },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverlapsExisting { conflicting } => write!(f, "overlaps {conflicting}"),
            Self::Unreadable { message } => write!(f, "unreadable: {message}"),
        }
    }
}

/// A rejected candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// The candidate, normalized.
    pub path: String,

    /// Why it was turned away.
    #[serde(flatten)]
    pub reason: RejectionReason,
}

/// Outcome of [`WatchedDirectoryRegistry::propose_add`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionResult {
    /// Roots now in the registry, in input order.
    pub admitted: Vec<String>,

    /// Candidates turned away.
    pub rejected: Vec<Rejection>,

    /// Partial-read diagnostics from the admitted roots' builds.
    pub diagnostics: Vec<BuildDiagnostic>,
}

impl AdmissionResult {
    /// Candidates rejected for overlapping an existing root.
    pub fn overlapping(&self) -> impl Iterator<Item = &Rejection> {
        self.rejected
            .iter()
            .filter(|r| matches!(r.reason, RejectionReason::OverlapsExisting { .. }))
    }

    /// Candidates rejected because they could not be read.
    pub fn unreadable(&self) -> impl Iterator<Item = &Rejection> {
        self.rejected
            .iter()
            .filter(|r| matches!(r.reason, RejectionReason::Unreadable { .. }))
    }
}

/// Outcome of [`WatchedDirectoryRegistry::rebuild`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// The root owning the path was rebuilt.
    Rebuilt {
        root: String,
        diagnostics: Vec<BuildDiagnostic>,
    },

    /// No watched root contains the path.
    NotWatched,

    /// The root was removed or rebuilt again before this build finished.
    Superseded,
}

/// Immutable snapshot of the registry handed to readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryView {
    /// Incremented on every published change.
    pub revision: u64,

    /// Root trees in display order.
    pub roots: Vec<DirectoryTreeNode>,

    /// Selected node ids.
    pub selection: Vec<String>,
}

struct RegistryState {
    roots: IndexMap<String, WatchedRoot>,
    /// Admissions whose trees are still being built.
    reserved: IndexMap<String, u64>,
    /// Rebuilds in flight, by root.
    rebuilding: HashMap<String, u64>,
    selection: PathSet,
    next_generation: u64,
    revision: u64,
}

impl RegistryState {
    fn new(policy: PathPolicy) -> Self {
        Self {
            roots: IndexMap::new(),
            reserved: IndexMap::new(),
            rebuilding: HashMap::new(),
            selection: PathSet::new(policy),
            next_generation: 0,
            revision: 0,
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Roots plus in-flight admissions.
    fn occupied(&self) -> impl Iterator<Item = &str> {
        self.roots
            .keys()
            .chain(self.reserved.keys())
            .map(String::as_str)
    }

    fn owning_root(&self, policy: &PathPolicy, path: &str) -> Option<String> {
        self.roots
            .keys()
            .find(|root| policy.is_ancestor_or_self(root, path))
            .cloned()
    }

    fn prune_selection(&mut self) {
        let roots = &self.roots;
        self.selection
            .retain(|id| roots.values().any(|root| root.tree.contains(id)));
    }

    fn view(&self) -> RegistryView {
        RegistryView {
            revision: self.revision,
            roots: self.roots.values().map(|r| r.tree.clone()).collect(),
            selection: self.selection.to_vec(),
        }
    }
}

/// Owns the watched roots, their trees and the current selection.
///
/// No two roots ever overlap: a candidate that equals, contains, or lies
/// within an existing root is rejected at admission.
pub struct WatchedDirectoryRegistry {
    state: RwLock<RegistryState>,
    builder: TreeBuilder,
    policy: PathPolicy,
    view_tx: watch::Sender<Arc<RegistryView>>,
}

impl WatchedDirectoryRegistry {
    /// Create an empty registry.
    pub fn new(builder: TreeBuilder) -> Self {
        let policy = builder.policy();
        let (view_tx, _) = watch::channel(Arc::new(RegistryView::default()));

        Self {
            state: RwLock::new(RegistryState::new(policy)),
            builder,
            policy,
            view_tx,
        }
    }

    /// The path policy in use.
    pub fn policy(&self) -> PathPolicy {
        self.policy
    }

    /// Propose new roots.
    ///
    /// Candidates are checked in input order against the existing roots and
    /// against candidates admitted earlier in the same call. Duplicates,
    /// ancestors and descendants are rejected as overlapping. Survivors have
    /// their trees built; a survivor whose listing fails is rejected as
    /// unreadable.
    pub async fn propose_add<I, S>(&self, candidates: I) -> AdmissionResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates: Vec<String> = candidates
            .into_iter()
            .map(|c| self.policy.normalize(c.as_ref()))
            .collect();

        let mut result = AdmissionResult::default();
        let mut reserved = Vec::new();

        {
            let mut state = self.state.write().await;
            for path in candidates {
                let conflict = self
                    .policy
                    .find_conflict(&path, state.occupied())
                    .map(str::to_string);

                if let Some(conflicting) = conflict {
                    debug!("Rejecting {path}: overlaps {conflicting}");
                    result.rejected.push(Rejection {
                        path,
                        reason: RejectionReason::OverlapsExisting { conflicting },
                    });
                    continue;
                }

                let generation = state.next_generation();
                state.reserved.insert(path.clone(), generation);
                reserved.push((path, generation));
            }
        }

        if reserved.is_empty() {
            return result;
        }

        let builds = join_all(reserved.iter().map(|(path, _)| self.builder.build(path))).await;

        let mut state = self.state.write().await;
        for ((path, generation), outcome) in reserved.into_iter().zip(builds) {
            if state.reserved.get(&path) != Some(&generation) {
                warn!("Discarding stale build for {path}: removed while building");
                continue;
            }
            state.reserved.shift_remove(&path);

            match outcome {
                Ok(built) => {
                    info!("Admitted watched directory: {path}");
                    result.diagnostics.extend(built.diagnostics.iter().cloned());
                    state.roots.insert(
                        path.clone(),
                        WatchedRoot {
                            tree: built.root,
                            diagnostics: built.diagnostics,
                        },
                    );
                    result.admitted.push(path);
                }
                Err(e) => {
                    warn!("Rejecting {path}: {e}");
                    result.rejected.push(Rejection {
                        path,
                        reason: RejectionReason::Unreadable {
                            message: e.to_string(),
                        },
                    });
                }
            }
        }

        if !result.admitted.is_empty() {
            self.publish(&mut state);
        }
        result
    }

    /// Remove a root and everything beneath it, including selected nodes.
    ///
    /// A root whose admission is still building is dropped as well; its
    /// build result is discarded when it arrives. Returns false if the path
    /// was neither a root nor pending.
    pub async fn remove(&self, path: &str) -> bool {
        let path = self.policy.normalize(path);
        let mut state = self.state.write().await;

        let was_root = state.roots.shift_remove(&path).is_some();
        let was_pending = state.reserved.shift_remove(&path).is_some();
        state.rebuilding.remove(&path);

        if !was_root && !was_pending {
            debug!("Ignoring removal of unwatched path: {path}");
            return false;
        }

        let deselected = state.selection.remove_within(&path);
        info!(
            "Removed watched directory: {path} ({} selected nodes cleared)",
            deselected.len()
        );

        self.publish(&mut state);
        true
    }

    /// Rebuild the tree of the root that contains `path`.
    ///
    /// A failed build leaves the previous tree in place.
    pub async fn rebuild(&self, path: &str) -> Result<RebuildOutcome> {
        let (root, generation) = {
            let mut state = self.state.write().await;
            let Some(root) = state.owning_root(&self.policy, path) else {
                return Ok(RebuildOutcome::NotWatched);
            };
            let generation = state.next_generation();
            state.rebuilding.insert(root.clone(), generation);
            (root, generation)
        };

        let outcome = self.builder.build(&root).await;

        let mut state = self.state.write().await;
        if state.rebuilding.get(&root) != Some(&generation) || !state.roots.contains_key(&root) {
            debug!("Discarding superseded rebuild of {root}");
            return Ok(RebuildOutcome::Superseded);
        }
        state.rebuilding.remove(&root);

        let built = outcome?;
        let diagnostics = built.diagnostics.clone();
        state.roots.insert(
            root.clone(),
            WatchedRoot {
                tree: built.root,
                diagnostics: built.diagnostics,
            },
        );
        state.prune_selection();
        debug!("Rebuilt tree for {root}");

        self.publish(&mut state);
        Ok(RebuildOutcome::Rebuilt { root, diagnostics })
    }

    /// Replace the selection.
    ///
    /// Ids that are not a node of any tree are ignored. Returns the accepted
    /// selection.
    pub async fn set_selection<I, S>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = ids
            .into_iter()
            .map(|id| self.policy.normalize(id.as_ref()))
            .collect();

        let mut state = self.state.write().await;
        state.selection.clear();
        for id in ids {
            if state.roots.values().any(|root| root.tree.contains(&id)) {
                state.selection.insert(&id);
            } else {
                debug!("Ignoring selection of unknown node: {id}");
            }
        }

        let accepted = state.selection.to_vec();
        self.publish(&mut state);
        accepted
    }

    /// Currently selected node ids.
    pub async fn selection(&self) -> Vec<String> {
        self.state.read().await.selection.to_vec()
    }

    /// Root paths in display order.
    pub async fn snapshot(&self) -> Vec<String> {
        self.state.read().await.roots.keys().cloned().collect()
    }

    /// Root trees in display order.
    pub async fn roots(&self) -> Vec<DirectoryTreeNode> {
        self.state
            .read()
            .await
            .roots
            .values()
            .map(|r| r.tree.clone())
            .collect()
    }

    /// A single root with its diagnostics.
    pub async fn root(&self, path: &str) -> Option<WatchedRoot> {
        let path = self.policy.normalize(path);
        self.state.read().await.roots.get(&path).cloned()
    }

    /// Whether `path` is a watched root.
    pub async fn contains(&self, path: &str) -> bool {
        let path = self.policy.normalize(path);
        self.state.read().await.roots.contains_key(&path)
    }

    /// Whether `path` has been admitted but its tree is still building.
    pub async fn is_pending(&self, path: &str) -> bool {
        let path = self.policy.normalize(path);
        self.state.read().await.reserved.contains_key(&path)
    }

    /// The watched root containing `path`, if any.
    pub async fn owning_root(&self, path: &str) -> Option<String> {
        self.state.read().await.owning_root(&self.policy, path)
    }

    /// The latest published view.
    pub fn view(&self) -> Arc<RegistryView> {
        self.view_tx.borrow().clone()
    }

    /// Subscribe to registry changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RegistryView>> {
        self.view_tx.subscribe()
    }

    fn publish(&self, state: &mut RegistryState) {
        state.revision += 1;
        self.view_tx.send_replace(Arc::new(state.view()));
    }
}
