//! Task registry — the single point of truth for task lookup and mutation
//!
//! Every task lives behind its own async mutex inside a shared map, giving
//! each URL a single-writer discipline: the one active dispatch cycle and the
//! progress aggregator serialize their mutations through the task lock, and
//! snapshot readers can never observe a partially-applied field group.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::types::{Eta, Speed, TaskSnapshot, TaskStats, TaskStatus};

/// Mutable state of one task, guarded by the task's mutex
pub(crate) struct TaskState {
    /// Target directory, fixed at creation and never updated
    pub(crate) destination: PathBuf,
    /// Current lifecycle status
    pub(crate) status: TaskStatus,
    /// Progress percentage in [0, 100]
    pub(crate) progress: f32,
    /// Bytes transferred so far
    pub(crate) downloaded_bytes: u64,
    /// Total size in bytes (0 = unknown)
    pub(crate) total_bytes: u64,
    /// Instantaneous speed
    pub(crate) speed: Speed,
    /// Estimated time remaining
    pub(crate) eta: Eta,
    /// Resolved output filename
    pub(crate) filename: Option<String>,
    /// Final failure description
    pub(crate) error_message: Option<String>,
    /// When the first attempt of the current dispatch sequence began
    pub(crate) start_time: Option<DateTime<Utc>>,
    /// Attempt number within the current dispatch sequence
    pub(crate) attempt: u32,
    /// Cooperative cancel signal; replaced on reset so a new dispatch
    /// sequence starts with a fresh token
    pub(crate) cancel: CancellationToken,
    /// A dispatch cycle currently owns this task
    pub(crate) dispatch_active: bool,
    /// A submission arrived while a cycle was active; run one fresh cycle
    /// after the active one unwinds
    pub(crate) redispatch_pending: bool,
    /// The current dispatch sequence has emitted its terminal history record
    pub(crate) settled: bool,
}

impl TaskState {
    fn new(destination: PathBuf) -> Self {
        Self {
            destination,
            status: TaskStatus::Pending,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            speed: Speed::Computing,
            eta: Eta::Computing,
            filename: None,
            error_message: None,
            start_time: None,
            attempt: 0,
            cancel: CancellationToken::new(),
            dispatch_active: false,
            redispatch_pending: false,
            settled: false,
        }
    }

    /// Reset for a fresh dispatch sequence after a terminal state.
    ///
    /// The destination is deliberately left untouched — it is fixed at
    /// creation. The cancellation token is replaced so a previously
    /// cancelled task can run again.
    pub(crate) fn reset_for_redispatch(&mut self) {
        self.status = TaskStatus::Pending;
        self.progress = 0.0;
        self.downloaded_bytes = 0;
        self.total_bytes = 0;
        self.speed = Speed::Computing;
        self.eta = Eta::Computing;
        self.filename = None;
        self.error_message = None;
        self.start_time = None;
        self.attempt = 0;
        self.cancel = CancellationToken::new();
        self.settled = false;
    }

    /// Clone the current field group into a poller-facing snapshot
    pub(crate) fn snapshot(&self, url: &str) -> TaskSnapshot {
        TaskSnapshot {
            url: url.to_string(),
            destination: self.destination.clone(),
            status: self.status,
            progress: self.progress,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            speed: self.speed,
            eta: self.eta,
            filename: self.filename.clone(),
            error_message: self.error_message.clone(),
            start_time: self.start_time,
            attempt: self.attempt,
        }
    }
}

/// One task record: the URL key plus its lock-guarded state
pub(crate) struct TaskHandle {
    /// The task's URL (registry key)
    pub(crate) url: String,
    /// Lock-guarded mutable state
    pub(crate) state: Mutex<TaskState>,
}

/// Keyed store of tasks — lookup, idempotent creation, snapshot reads
///
/// Tasks live for the lifetime of the registry; there is no eviction.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, Arc<TaskHandle>>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a task by URL, creating it in `Pending` if absent.
    ///
    /// Idempotent per URL: a second call returns the existing task and never
    /// updates its destination.
    pub(crate) async fn get_or_create(&self, url: &str, destination: &Path) -> Arc<TaskHandle> {
        if let Some(handle) = self.get(url).await {
            return handle;
        }

        let mut tasks = self.tasks.write().await;
        // Re-check under the write lock — another caller may have won the race
        if let Some(handle) = tasks.get(url) {
            return Arc::clone(handle);
        }

        let handle = Arc::new(TaskHandle {
            url: url.to_string(),
            state: Mutex::new(TaskState::new(destination.to_path_buf())),
        });
        tasks.insert(url.to_string(), Arc::clone(&handle));
        tracing::debug!(url = %url, destination = %destination.display(), "Task created");
        handle
    }

    /// Look up a task by URL
    pub(crate) async fn get(&self, url: &str) -> Option<Arc<TaskHandle>> {
        self.tasks.read().await.get(url).map(Arc::clone)
    }

    /// Read-only snapshot of one task, or `None` for an unknown URL
    pub async fn snapshot(&self, url: &str) -> Option<TaskSnapshot> {
        let handle = self.get(url).await?;
        let state = handle.state.lock().await;
        Some(state.snapshot(&handle.url))
    }

    /// Read-only snapshots of every task, in no particular order
    pub async fn snapshots(&self) -> Vec<TaskSnapshot> {
        let handles: Vec<Arc<TaskHandle>> =
            self.tasks.read().await.values().map(Arc::clone).collect();

        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            let state = handle.state.lock().await;
            snapshots.push(state.snapshot(&handle.url));
        }
        snapshots
    }

    /// Aggregate task counts by status
    pub async fn stats(&self) -> TaskStats {
        let mut stats = TaskStats::default();
        for snapshot in self.snapshots().await {
            stats.total += 1;
            match snapshot.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Downloading => stats.downloading += 1,
                TaskStatus::Paused => stats.paused += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Error => stats.error += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
