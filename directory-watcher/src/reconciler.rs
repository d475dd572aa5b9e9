//! Converges the durable watch service on the registry's roots.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use indexmap::IndexSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, ServiceError, WatcherError};
use crate::service::WatchService;

/// A single command sent to the watch service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOp {
    /// Start watching a path.
    Watch,

    /// Stop watching a path.
    Unwatch,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOp::Watch => f.write_str("watch"),
            SyncOp::Unwatch => f.write_str("unwatch"),
        }
    }
}

/// A command the service rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Path the command was for.
    pub path: String,

    /// Command that failed.
    pub op: SyncOp,

    /// Service's reason.
    pub message: String,
}

/// Paths to watch and unwatch to get from the last confirmed state to the
/// current one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDiff {
    /// Current paths the service has not confirmed.
    pub added: Vec<String>,

    /// Confirmed paths that are no longer current.
    pub removed: Vec<String>,
}

impl SyncDiff {
    /// Whether the service already matches.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Paths newly confirmed as watched.
    pub watched: Vec<String>,

    /// Paths confirmed as no longer watched.
    pub unwatched: Vec<String>,

    /// Commands that failed; their paths are retried on the next pass.
    pub failures: Vec<SyncFailure>,
}

impl ReconcileReport {
    /// Whether every command sent in the pass succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct SyncState {
    snapshot: IndexSet<String>,
    in_flight: HashSet<(SyncOp, String)>,
}

impl SyncState {
    fn diff(&self, current: &[String]) -> SyncDiff {
        let added = current
            .iter()
            .filter(|p| !self.snapshot.contains(p.as_str()))
            .cloned()
            .collect();
        let removed = self
            .snapshot
            .iter()
            .filter(|p| !current.contains(p))
            .cloned()
            .collect();
        SyncDiff { added, removed }
    }
}

/// Claim on a command while it is outstanding. Released on drop, so a
/// cancelled pass frees its paths for the next one.
struct InFlight<'a> {
    state: &'a Mutex<SyncState>,
    op: SyncOp,
    path: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let key = (self.op, std::mem::take(&mut self.path));
        self.state.lock().in_flight.remove(&key);
    }
}

/// Tracks what the watch service has confirmed and sends the difference.
///
/// The snapshot only changes when the service confirms a command, so a
/// failed path stays in the diff and is retried on the next pass. State is
/// locked only to read or commit, never across a service call: passes may
/// overlap, and a command already outstanding is not sent again.
pub struct SyncReconciler {
    service: Arc<dyn WatchService>,
    command_timeout: Option<Duration>,
    state: Mutex<SyncState>,
}

impl SyncReconciler {
    /// Create a reconciler with an empty confirmed state.
    pub fn new(service: Arc<dyn WatchService>) -> Self {
        Self::with_snapshot(service, Vec::<String>::new())
    }

    /// Create a reconciler that treats `paths` as already confirmed.
    pub fn with_snapshot<I, S>(service: Arc<dyn WatchService>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service,
            command_timeout: None,
            state: Mutex::new(SyncState {
                snapshot: paths.into_iter().map(Into::into).collect(),
                in_flight: HashSet::new(),
            }),
        }
    }

    /// Give up on a command that has not been answered within `timeout`.
    ///
    /// A command that times out is reported as a failure and retried on the
    /// next pass.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Last confirmed set of watched paths.
    pub fn snapshot(&self) -> Vec<String> {
        self.state.lock().snapshot.iter().cloned().collect()
    }

    /// Whether the service has confirmed `path` as watched.
    pub fn is_confirmed(&self, path: &str) -> bool {
        self.state.lock().snapshot.contains(path)
    }

    /// What a reconcile against `current` would send, ignoring commands
    /// already outstanding.
    pub fn diff(&self, current: &[String]) -> SyncDiff {
        self.state.lock().diff(current)
    }

    /// Paths in `current` the service has not confirmed yet.
    pub fn soft_pending(&self, current: &[String]) -> Vec<String> {
        self.diff(current).added
    }

    /// Commands sent and not yet answered.
    pub fn in_flight(&self) -> Vec<(SyncOp, String)> {
        self.state.lock().in_flight.iter().cloned().collect()
    }

    /// Send watch/unwatch commands until the service matches `current`.
    ///
    /// Commands run concurrently and each confirmation is committed as it
    /// arrives. A rejected command leaves its path for the next pass. If the
    /// service was unreachable for any command, the confirmations that did
    /// arrive are kept and [`WatcherError::SyncInterrupted`] carries the
    /// report of the pass.
    pub async fn reconcile(&self, current: &[String]) -> Result<ReconcileReport> {
        let claims = self.claim(current);
        if claims.is_empty() {
            return Ok(ReconcileReport::default());
        }

        debug!("Reconciling watch service: {} commands", claims.len());

        let mut pending: FuturesUnordered<_> = claims
            .into_iter()
            .map(|claim| self.run_command(claim))
            .collect();

        let mut report = ReconcileReport::default();
        let mut unavailable = None;

        while let Some((op, path, outcome)) = pending.next().await {
            match (outcome, op) {
                (Ok(()), SyncOp::Watch) => report.watched.push(path),
                (Ok(()), SyncOp::Unwatch) => report.unwatched.push(path),
                (Err(e), op) => {
                    warn!("Failed to {op} {path}: {e}");
                    if e.is_unavailable() && unavailable.is_none() {
                        unavailable = Some(e.to_string());
                    }
                    report.failures.push(SyncFailure {
                        path,
                        op,
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(message) = unavailable {
            return Err(WatcherError::SyncInterrupted {
                message,
                report: Box::new(report),
            });
        }

        if !report.watched.is_empty() || !report.unwatched.is_empty() {
            info!(
                "Watch service updated: {} watched, {} unwatched, {} failed",
                report.watched.len(),
                report.unwatched.len(),
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Reserve the commands needed to reach `current` that no other pass is
    /// already running.
    fn claim(&self, current: &[String]) -> Vec<InFlight<'_>> {
        let mut state = self.state.lock();
        let diff = state.diff(current);

        let commands = diff
            .added
            .into_iter()
            .map(|path| (SyncOp::Watch, path))
            .chain(diff.removed.into_iter().map(|path| (SyncOp::Unwatch, path)));

        let mut claims = Vec::new();
        for (op, path) in commands {
            if state.in_flight.insert((op, path.clone())) {
                claims.push((op, path));
            } else {
                debug!("Already sent {op} {path}, waiting for its reply");
            }
        }
        drop(state);

        claims
            .into_iter()
            .map(|(op, path)| InFlight {
                state: &self.state,
                op,
                path,
            })
            .collect()
    }

    async fn run_command(
        &self,
        claim: InFlight<'_>,
    ) -> (SyncOp, String, std::result::Result<(), ServiceError>) {
        let (op, path) = (claim.op, claim.path.clone());
        let request = async {
            match op {
                SyncOp::Watch => self.service.watch(&path).await,
                SyncOp::Unwatch => self.service.unwatch(&path).await,
            }
        };
        let outcome = match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or(Err(ServiceError::TimedOut(limit))),
            None => request.await,
        };

        if outcome.is_ok() {
            let mut state = self.state.lock();
            match op {
                SyncOp::Watch => {
                    state.snapshot.insert(path.clone());
                }
                SyncOp::Unwatch => {
                    state.snapshot.shift_remove(&path);
                }
            }
        }
        drop(claim);
        (op, path, outcome)
    }
}
