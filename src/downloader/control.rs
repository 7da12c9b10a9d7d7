//! Submission and task control — enqueue, cancel, pause, resume, polling.

use std::path::Path;
use std::sync::atomic::Ordering;

use super::{MediaDownloader, QueueEntry};
use crate::types::{Event, TaskSnapshot, TaskStats, TaskStatus};

impl MediaDownloader {
    /// Submit a URL for download into the given destination directory
    ///
    /// Idempotent per URL: re-submitting a URL that is pending or downloading
    /// does not create a second task, and never changes the destination
    /// chosen at creation. Re-submitting a URL that already finished
    /// (completed, failed, or cancelled) resets it for a fresh run with a
    /// fresh retry budget.
    ///
    /// This never blocks and never fails; submissions made during shutdown
    /// are dropped with a warning.
    pub async fn enqueue(&self, url: impl Into<String>, destination: impl AsRef<Path>) {
        let url = url.into();
        let destination = destination.as_ref();

        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            tracing::warn!(url = %url, "Shutting down, dropping submission");
            return;
        }

        let handle = self.registry.get_or_create(&url, destination).await;
        {
            let mut state = handle.state.lock().await;
            if state.dispatch_active {
                // An attempt cycle owns the task right now; run one fresh
                // cycle after it unwinds instead of racing it
                state.redispatch_pending = true;
                tracing::debug!(url = %url, "Cycle active, deferring re-dispatch");
            } else if state.status.is_terminal() {
                state.reset_for_redispatch();
                tracing::debug!(url = %url, "Re-submission of a finished task, starting a fresh run");
            }
        }

        if self
            .queue_state
            .queue_tx
            .send(QueueEntry {
                url: url.clone(),
                destination: destination.to_path_buf(),
            })
            .is_err()
        {
            tracing::warn!(url = %url, "Dispatch queue closed, dropping submission");
            return;
        }

        self.emit_event(Event::Queued { url });
    }

    /// Cancel a task
    ///
    /// Sets the task's cancellation token and flips its status to
    /// `Cancelled` immediately. Cancellation is cooperative: an engine call
    /// already in flight is not interrupted, but the dispatcher observes the
    /// token at its next checkpoint and discards the late result. Unknown
    /// URLs and tasks already in a terminal state are no-ops.
    pub async fn cancel(&self, url: &str) {
        let Some(handle) = self.registry.get(url).await else {
            tracing::debug!(url = %url, "Cancel for unknown task, ignoring");
            return;
        };

        {
            let mut state = handle.state.lock().await;
            if state.status.is_terminal() {
                tracing::debug!(url = %url, status = %state.status, "Cancel on finished task, ignoring");
                return;
            }
            state.cancel.cancel();
            state.status = TaskStatus::Cancelled;
        }

        tracing::info!(url = %url, "Cancellation requested");
        self.emit_event(Event::Cancelled {
            url: url.to_string(),
        });
    }

    /// Pause a task for display
    ///
    /// Display-only: the status flips to `Paused` but the dispatcher keeps
    /// processing the task and an in-flight transfer keeps running. Unknown
    /// URLs and finished tasks are no-ops.
    pub async fn pause(&self, url: &str) {
        let Some(handle) = self.registry.get(url).await else {
            tracing::debug!(url = %url, "Pause for unknown task, ignoring");
            return;
        };

        {
            let mut state = handle.state.lock().await;
            if state.status.is_terminal() {
                return;
            }
            state.status = TaskStatus::Paused;
        }

        self.emit_event(Event::Paused {
            url: url.to_string(),
        });
    }

    /// Resume a paused task back to `Pending` for display
    ///
    /// Only affects tasks currently shown as `Paused`; everything else is a
    /// no-op.
    pub async fn resume(&self, url: &str) {
        let Some(handle) = self.registry.get(url).await else {
            tracing::debug!(url = %url, "Resume for unknown task, ignoring");
            return;
        };

        {
            let mut state = handle.state.lock().await;
            if state.status != TaskStatus::Paused {
                return;
            }
            state.status = TaskStatus::Pending;
        }

        self.emit_event(Event::Resumed {
            url: url.to_string(),
        });
    }

    /// Read-only snapshot of one task, or `None` for an unknown URL
    pub async fn get_task(&self, url: &str) -> Option<TaskSnapshot> {
        self.registry.snapshot(url).await
    }

    /// Read-only snapshots of every task
    pub async fn list_tasks(&self) -> Vec<TaskSnapshot> {
        self.registry.snapshots().await
    }

    /// Aggregate task counts by status
    pub async fn stats(&self) -> TaskStats {
        self.registry.stats().await
    }
}
