//! Dispatch cycle — runs one task's attempt sequence to a terminal state.
//!
//! A cycle owns its task exclusively (`dispatch_active`), holds one admission
//! permit for its whole duration, and checks the cancellation token at every
//! checkpoint: before an attempt, before the engine call, after the engine
//! call returns, and after waking from a backoff sleep. The backoff sleep
//! itself is deliberately uninterruptible.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::QueueEntry;
use crate::config::{Config, EngineOptions};
use crate::engine::{DownloadEngine, ProgressEvent};
use crate::error::EngineError;
use crate::history::HistorySink;
use crate::registry::{TaskHandle, TaskState};
use crate::retry::RetryPolicy;
use crate::types::{Eta, Event, HistoryRecord, Speed, TaskStatus};

/// Shared context for a single dispatch cycle, reducing parameter passing
/// between helpers.
pub(crate) struct DispatchContext {
    pub(crate) url: String,
    pub(crate) handle: Arc<TaskHandle>,
    /// Token captured when the cycle claimed the task; `cancel()` fires it
    pub(crate) cancel: CancellationToken,
    pub(crate) engine: Arc<dyn DownloadEngine>,
    pub(crate) history: Arc<dyn HistorySink>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) config: Arc<RwLock<Arc<Config>>>,
    pub(crate) progress_tx: mpsc::Sender<ProgressEvent>,
    pub(crate) queue_tx: mpsc::UnboundedSender<QueueEntry>,
}

impl DispatchContext {
    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Append a history record; sink failures are logged, never propagated
    async fn append_history(&self, record: HistoryRecord) {
        if let Err(e) = self.history.append(&record).await {
            tracing::error!(url = %self.url, sink = self.history.name(), error = %e, "Failed to append history record");
        }
    }
}

/// Run one task's dispatch cycle: the attempt loop, then cycle bookkeeping.
pub(crate) async fn run_dispatch_cycle(ctx: DispatchContext) {
    run_attempts(&ctx).await;
    finish_cycle(&ctx).await;
}

/// The attempt loop: cancellation checkpoints around each engine call and
/// exponential backoff between failures.
async fn run_attempts(ctx: &DispatchContext) {
    let mut attempt: u32 = 1;

    loop {
        // Checkpoint: before the attempt (also re-checks after a backoff
        // sleep, since the loop comes back around here)
        if ctx.cancel.is_cancelled() {
            settle_cancelled(ctx).await;
            return;
        }

        // Fresh configuration snapshot per attempt: a live settings change
        // affects the next retry, never the attempt in flight
        let config = ctx.config.read().await.clone();
        let policy = RetryPolicy::new(&config.retry);
        let destination = { ctx.handle.state.lock().await.destination.clone() };
        let options = EngineOptions::snapshot(&config, &destination);

        {
            let mut state = ctx.handle.state.lock().await;
            state.status = TaskStatus::Downloading;
            if state.start_time.is_none() {
                state.start_time = Some(Utc::now());
            }
            state.attempt = attempt;
        }
        ctx.emit(Event::Started {
            url: ctx.url.clone(),
            attempt,
        });
        tracing::info!(url = %ctx.url, attempt, format = %options.format, "Starting download attempt");

        // Informational format discovery; failures degrade to an empty listing
        match ctx.engine.list_formats(&ctx.url, &options).await {
            Ok(formats) => {
                tracing::debug!(url = %ctx.url, count = formats.len(), "Available formats")
            }
            Err(e) => tracing::warn!(url = %ctx.url, error = %e, "Format listing failed"),
        }

        // Checkpoint: before the engine call
        if ctx.cancel.is_cancelled() {
            settle_cancelled(ctx).await;
            return;
        }

        let result = ctx
            .engine
            .download(&ctx.url, &options, ctx.progress_tx.clone())
            .await;

        // Checkpoint: after the engine call returns. A cancellation that
        // raced the transfer wins and the late result is discarded.
        if ctx.cancel.is_cancelled() {
            settle_cancelled(ctx).await;
            return;
        }

        match result {
            Ok(()) => {
                settle_completed(ctx).await;
                return;
            }
            Err(e) if policy.is_final_attempt(attempt) => {
                settle_error(ctx, attempt, e).await;
                return;
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    url = %ctx.url,
                    attempt,
                    max_retries = policy.max_retries(),
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Attempt failed, backing off"
                );
                ctx.emit(Event::Retrying {
                    url: ctx.url.clone(),
                    attempt,
                    delay_secs: delay.as_secs(),
                });
                // Uninterruptible by design; the token is checked right
                // after waking, at the top of the next iteration
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Cycle bookkeeping: release the task and honor a deferred re-dispatch.
async fn finish_cycle(ctx: &DispatchContext) {
    let redispatch = {
        let mut state = ctx.handle.state.lock().await;
        state.dispatch_active = false;
        if state.redispatch_pending {
            state.redispatch_pending = false;
            state.reset_for_redispatch();
            Some(state.destination.clone())
        } else {
            None
        }
    };

    if let Some(destination) = redispatch {
        tracing::debug!(url = %ctx.url, "Running deferred re-dispatch");
        if ctx
            .queue_tx
            .send(QueueEntry {
                url: ctx.url.clone(),
                destination,
            })
            .is_err()
        {
            tracing::warn!(url = %ctx.url, "Queue closed, dropping deferred re-dispatch");
        }
    }
}

fn build_record(url: &str, state: &TaskState, end_time: Option<DateTime<Utc>>) -> HistoryRecord {
    HistoryRecord {
        url: url.to_string(),
        filename: state.filename.clone(),
        destination: state.destination.clone(),
        start_time: state.start_time.unwrap_or_else(Utc::now),
        end_time,
        status: state.status,
        error_message: state.error_message.clone(),
        file_size: if state.total_bytes > 0 {
            state.total_bytes
        } else {
            state.downloaded_bytes
        },
    }
}

async fn settle_completed(ctx: &DispatchContext) {
    let (record, filename) = {
        let mut state = ctx.handle.state.lock().await;
        state.status = TaskStatus::Completed;
        state.progress = 100.0;
        state.speed = Speed::Done;
        state.eta = Eta::Done;
        state.settled = true;
        (
            build_record(&ctx.url, &state, Some(Utc::now())),
            state.filename.clone(),
        )
    };

    ctx.append_history(record).await;
    ctx.emit(Event::Completed {
        url: ctx.url.clone(),
        filename,
    });
    tracing::info!(url = %ctx.url, "Download completed");
}

async fn settle_error(ctx: &DispatchContext, attempt: u32, error: EngineError) {
    let message = error.to_string();
    let record = {
        let mut state = ctx.handle.state.lock().await;
        state.status = TaskStatus::Error;
        state.error_message = Some(message.clone());
        state.settled = true;
        build_record(&ctx.url, &state, Some(Utc::now()))
    };

    ctx.append_history(record).await;
    ctx.emit(Event::Failed {
        url: ctx.url.clone(),
        error: message.clone(),
    });
    tracing::error!(url = %ctx.url, attempts = attempt, error = %message, "Download failed, retry budget exhausted");
}

async fn settle_cancelled(ctx: &DispatchContext) {
    let (record, already_cancelled) = {
        let mut state = ctx.handle.state.lock().await;
        let already_cancelled = state.status == TaskStatus::Cancelled;
        state.status = TaskStatus::Cancelled;
        state.settled = true;
        // Cancellation is not a failure: no end time, no error message
        (build_record(&ctx.url, &state, None), already_cancelled)
    };

    ctx.append_history(record).await;
    // The cancel() call already announced the cancellation; only a token
    // observed without it (e.g. shutdown tooling) still needs an event
    if !already_cancelled {
        ctx.emit(Event::Cancelled {
            url: ctx.url.clone(),
        });
    }
    tracing::info!(url = %ctx.url, "Download cancelled");
}
