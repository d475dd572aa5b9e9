//! The library panel: watched roots, their trees, and the search scope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use rover_directory_watcher::{
    AdmissionResult, ChangeBatch, DirectoryChange, DirectoryLister, DirectoryTreeNode,
    IdentityProjector, LocalDirectoryLister, RebuildOutcome, ReconcileReport, RegistryView,
    SelectionProjector, SyncReconciler, TreeBuilder, WatchService, WatchedDirectoryRegistry,
    WatcherError,
};
use rover_task_status::{BusyState, TaskReporter, TaskStatusMap, TaskStatusTracker};

use crate::config::LibraryConfig;
use crate::error::{LibraryError, Result};

/// Watched-directory panel of a reference library.
///
/// This is the main entry point for managing library folders. It coordinates:
/// - Admission of new roots and removal of existing ones
/// - Mirroring each root's subdirectories as a tree
/// - Keeping the watch service in step with the roots
/// - Turning the tree selection into search prefixes
///
/// Directory scans and sync passes are reported as background tasks.
pub struct LibraryPanel {
    /// Configuration.
    config: LibraryConfig,

    /// Watched roots, trees, and selection.
    registry: Arc<WatchedDirectoryRegistry>,

    /// Confirmed watch-service state and outstanding commands.
    reconciler: SyncReconciler,

    /// Selection to search-prefix mapping.
    projector: Arc<dyn SelectionProjector>,

    /// Task notifications for scans and syncs.
    tasks: TaskReporter,

    /// Latest task status map.
    task_statuses: watch::Receiver<Arc<TaskStatusMap>>,

    /// Roots restored at startup.
    startup: AdmissionResult,

    /// When the last sync pass finished without the service being down.
    last_sync: RwLock<Option<DateTime<Utc>>>,
}

impl LibraryPanel {
    /// Create a new panel builder.
    pub fn builder() -> LibraryPanelBuilder {
        LibraryPanelBuilder::new()
    }

    /// Open the panel, restoring the roots the watch service already holds.
    ///
    /// Only restored roots count as confirmed. A persisted root that can no
    /// longer be read, or that overlaps another, is reported in
    /// [`Self::startup_report`] and left untouched in the service.
    pub async fn open(
        config: LibraryConfig,
        lister: Arc<dyn DirectoryLister>,
        service: Arc<dyn WatchService>,
        projector: Arc<dyn SelectionProjector>,
    ) -> Result<Self> {
        info!("Opening library panel");

        let builder = TreeBuilder::new(lister, config.policy(), config.tree.clone());
        let registry = Arc::new(WatchedDirectoryRegistry::new(builder));

        let (tasks, events) = TaskReporter::channel();
        let tracker = TaskStatusTracker::new();
        let task_statuses = tracker.subscribe();
        tokio::spawn(tracker.run(events));

        let persisted = service
            .list_watched()
            .await
            .map_err(WatcherError::from)?;

        let startup = {
            let _scan = tasks.begin(format!("Scanning {} watched directories", persisted.len()));
            registry.propose_add(&persisted).await
        };
        for rejection in &startup.rejected {
            warn!("Not restoring {}: {}", rejection.path, rejection.reason);
        }

        let reconciler = SyncReconciler::with_snapshot(service, startup.admitted.iter().cloned())
            .with_command_timeout(config.sync.command_timeout());

        info!(
            "Library panel opened with {} watched directories",
            startup.admitted.len()
        );
        Ok(Self {
            config,
            registry,
            reconciler,
            projector,
            tasks,
            task_statuses,
            startup,
            last_sync: RwLock::new(None),
        })
    }

    /// Outcome of restoring the persisted roots.
    pub fn startup_report(&self) -> &AdmissionResult {
        &self.startup
    }

    /// The configuration in use.
    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// Propose new roots and sync any that were admitted.
    ///
    /// A sync failure does not undo admission; the new roots stay
    /// unconfirmed until a later sync succeeds. Only the commands for this
    /// call are awaited, never those of an earlier pass still waiting on the
    /// service.
    pub async fn add_directories<I, S>(&self, paths: I) -> AdmissionResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths: Vec<String> = paths.into_iter().map(|p| p.as_ref().to_string()).collect();

        let admission = {
            let _scan = self.tasks.begin(format!("Scanning {}", paths.join(", ")));
            self.registry.propose_add(&paths).await
        };

        if !admission.admitted.is_empty() {
            self.sync_logged().await;
        }
        admission
    }

    /// Remove a root and sync. Returns false if it was not watched.
    pub async fn remove_directory(&self, path: &str) -> bool {
        let removed = self.registry.remove(path).await;
        if removed {
            self.sync_logged().await;
        }
        removed
    }

    /// Bring the watch service in line with the current roots.
    ///
    /// Commands another pass has already sent are not repeated.
    pub async fn sync(&self) -> Result<ReconcileReport> {
        let current = self.registry.snapshot().await;

        let diff = self.reconciler.diff(&current);
        if diff.is_empty() {
            return Ok(ReconcileReport::default());
        }

        let _sync = self.tasks.begin(format!(
            "Syncing {} watched directory changes",
            diff.added.len() + diff.removed.len()
        ));
        let report = self.reconciler.reconcile(&current).await?;
        *self.last_sync.write().await = Some(Utc::now());

        for failure in &report.failures {
            warn!(
                "Watch service refused to {} {}: {}",
                failure.op, failure.path, failure.message
            );
        }
        Ok(report)
    }

    async fn sync_logged(&self) {
        if let Err(e) = self.sync().await {
            warn!("Sync deferred: {e}");
        }
    }

    /// Roots the watch service has not confirmed yet.
    pub async fn soft_pending(&self) -> Vec<String> {
        let current = self.registry.snapshot().await;
        self.reconciler.soft_pending(&current)
    }

    /// Replace the selection. Returns the ids that name existing nodes.
    pub async fn select<I, S>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registry.set_selection(ids).await
    }

    /// Currently selected node ids.
    pub async fn selection(&self) -> Vec<String> {
        self.registry.selection().await
    }

    /// Path prefixes a search should be limited to.
    pub async fn search_prefixes(&self) -> Vec<String> {
        self.projector.project(&self.registry.selection().await)
    }

    /// Watched root paths in display order.
    pub async fn watched_roots(&self) -> Vec<String> {
        self.registry.snapshot().await
    }

    /// Root trees in display order.
    pub async fn trees(&self) -> Vec<DirectoryTreeNode> {
        self.registry.roots().await
    }

    /// The latest registry view.
    pub fn view(&self) -> Arc<RegistryView> {
        self.registry.view()
    }

    /// Subscribe to registry changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RegistryView>> {
        self.registry.subscribe()
    }

    /// Rebuild the tree affected by a filesystem change.
    pub async fn handle_change(&self, change: &DirectoryChange) -> Result<RebuildOutcome> {
        debug!("Handling {:?} for {}", change.kind, change.path);
        let _scan = self.tasks.begin(format!("Rescanning {}", change.path));
        Ok(self.registry.rebuild(&change.path).await?)
    }

    /// Rebuild every root touched by a batch, once each.
    ///
    /// Returns the roots that were rebuilt. A root whose rebuild fails keeps
    /// its previous tree.
    pub async fn handle_changes(&self, batch: &ChangeBatch) -> Vec<String> {
        let mut roots = IndexSet::new();
        for path in batch.paths() {
            if let Some(root) = self.registry.owning_root(&path).await {
                roots.insert(root);
            }
        }

        let mut rebuilt = Vec::new();
        for root in roots {
            let _scan = self.tasks.begin(format!("Rescanning {root}"));
            match self.registry.rebuild(&root).await {
                Ok(RebuildOutcome::Rebuilt { root, .. }) => rebuilt.push(root),
                Ok(outcome) => debug!("Skipped rebuild of {root}: {outcome:?}"),
                Err(e) => warn!("Keeping previous tree for {root}: {e}"),
            }
        }
        rebuilt
    }

    /// Rebuild trees as changes arrive, until the channel closes.
    ///
    /// Changes that arrive together are handled as one batch.
    pub fn spawn_change_listener(
        self: &Arc<Self>,
        mut changes: mpsc::Receiver<DirectoryChange>,
    ) -> JoinHandle<()> {
        let panel = Arc::clone(self);
        tokio::spawn(async move {
            if !panel.config.sync.rebuild_on_change {
                info!("Rebuild on change disabled");
                return;
            }

            while let Some(first) = changes.recv().await {
                let mut batch = ChangeBatch::new();
                batch.push(first);
                while let Ok(change) = changes.try_recv() {
                    batch.push(change);
                }

                let rebuilt = panel.handle_changes(&batch).await;
                debug!(
                    "Handled {} changes, rebuilt {} roots",
                    batch.len(),
                    rebuilt.len()
                );
            }
            debug!("Change channel closed");
        })
    }

    /// Periodically retry unconfirmed changes. Returns `None` if retrying is
    /// disabled.
    pub fn spawn_retry_loop(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.config.sync.retry_interval()?;
        let panel = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                interval.tick().await;
                match panel.sync().await {
                    Ok(report) if !report.is_clean() => {
                        debug!("Retry left {} failures", report.failures.len());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Retry failed: {e}"),
                }
            }
        }))
    }

    /// Active background tasks.
    pub fn task_statuses(&self) -> Arc<TaskStatusMap> {
        self.task_statuses.borrow().clone()
    }

    /// Subscribe to task status changes.
    pub fn subscribe_tasks(&self) -> watch::Receiver<Arc<TaskStatusMap>> {
        self.task_statuses.clone()
    }

    /// Whether any background task is running.
    pub fn is_busy(&self) -> bool {
        !self.task_statuses.borrow().is_empty()
    }

    /// Status-bar summary of background tasks.
    pub fn busy_state(&self) -> BusyState {
        BusyState::from_statuses(&self.task_statuses.borrow())
    }

    /// Get panel statistics.
    pub async fn stats(&self) -> PanelStats {
        let trees = self.registry.roots().await;
        let soft_pending = self.soft_pending().await.len();

        PanelStats {
            watched_directories: trees.len(),
            directories_in_trees: trees.iter().map(DirectoryTreeNode::node_count).sum(),
            selected: self.registry.selection().await.len(),
            soft_pending,
            active_tasks: self.task_statuses.borrow().len(),
            last_sync: *self.last_sync.read().await,
        }
    }
}

/// Builder for the library panel.
pub struct LibraryPanelBuilder {
    config: LibraryConfig,
    lister: Option<Arc<dyn DirectoryLister>>,
    service: Option<Arc<dyn WatchService>>,
    projector: Option<Arc<dyn SelectionProjector>>,
}

impl LibraryPanelBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: LibraryConfig::default(),
            lister: None,
            service: None,
            projector: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: LibraryConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the directory lister. Defaults to the local filesystem.
    pub fn with_lister(mut self, lister: Arc<dyn DirectoryLister>) -> Self {
        self.lister = Some(lister);
        self
    }

    /// Set the watch service. Required.
    pub fn with_watch_service(mut self, service: Arc<dyn WatchService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Set the selection projector. Defaults to [`IdentityProjector`].
    pub fn with_projector(mut self, projector: Arc<dyn SelectionProjector>) -> Self {
        self.projector = Some(projector);
        self
    }

    /// Build the panel.
    pub async fn build(self) -> Result<LibraryPanel> {
        let service = self
            .service
            .ok_or_else(|| LibraryError::Builder("no watch service".to_string()))?;
        let lister = self
            .lister
            .unwrap_or_else(|| Arc::new(LocalDirectoryLister::new()));
        let projector = self
            .projector
            .unwrap_or_else(|| Arc::new(IdentityProjector));

        LibraryPanel::open(self.config, lister, service, projector).await
    }
}

impl Default for LibraryPanelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the library panel.
#[derive(Debug, Clone)]
pub struct PanelStats {
    /// Number of watched roots.
    pub watched_directories: usize,

    /// Directories across all root trees, roots included.
    pub directories_in_trees: usize,

    /// Number of selected nodes.
    pub selected: usize,

    /// Roots not yet confirmed by the watch service.
    pub soft_pending: usize,

    /// Number of running background tasks.
    pub active_tasks: usize,

    /// When the watch service last accepted a sync pass.
    pub last_sync: Option<DateTime<Utc>>,
}
