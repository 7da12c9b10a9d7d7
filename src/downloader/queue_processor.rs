//! Queue processor — drains the dispatch queue and admits work through the
//! concurrency gate.

use tokio::task::JoinHandle;

use super::dispatch::{DispatchContext, run_dispatch_cycle};
use super::{MediaDownloader, QueueEntry};

impl MediaDownloader {
    /// Start the queue processor task
    ///
    /// Spawns a background loop that continuously:
    /// 1. Receives the next `(url, destination)` entry from the queue
    /// 2. Resolves the task and claims it (one active cycle per task)
    /// 3. Acquires a permit from the admission gate, blocking while
    ///    `max_concurrent_downloads` attempts are already in flight
    /// 4. Spawns the dispatch cycle with the permit moved into it
    ///
    /// Admission is FIFO; completion order across tasks is not — a
    /// later-queued URL may finish first if its transfer is faster.
    ///
    /// Returns `None` when the processor is already running.
    pub async fn start_queue_processor(&self) -> Option<JoinHandle<()>> {
        let mut queue_rx = self.queue_state.queue_rx.lock().await.take()?;
        let downloader = self.clone();

        Some(tokio::spawn(async move {
            loop {
                let entry = tokio::select! {
                    _ = downloader.shutdown_token.cancelled() => break,
                    entry = queue_rx.recv() => match entry {
                        Some(entry) => entry,
                        None => break,
                    },
                };
                downloader.dispatch_entry(entry).await;
            }
            tracing::debug!("Queue processor stopped");
        }))
    }

    /// Handle one drained queue entry: claim the task, wait for admission,
    /// spawn its dispatch cycle.
    async fn dispatch_entry(&self, entry: QueueEntry) {
        // Resolve the task; enqueue always creates it first, so a miss is a
        // stray entry
        let Some(handle) = self.registry.get(&entry.url).await else {
            tracing::warn!(url = %entry.url, "Queue entry without a task, skipping");
            return;
        };

        // Claim the task. Within one task attempts are strictly sequential:
        // a duplicate entry for an already-claimed task is dropped here (the
        // enqueue path recorded the re-dispatch intent on the task), and an
        // entry whose dispatch sequence already settled is stale.
        let cancel = {
            let mut state = handle.state.lock().await;
            if state.dispatch_active {
                tracing::debug!(url = %entry.url, "Cycle already active, dropping duplicate entry");
                return;
            }
            if state.status.is_terminal() && state.settled {
                tracing::debug!(url = %entry.url, "Stale entry for a settled task, dropping");
                return;
            }
            state.dispatch_active = true;
            state.cancel.clone()
        };

        // Wait for an admission slot. The gate is re-read per entry so a
        // concurrency change applies to the next admission.
        let gate = self.queue_state.gate.read().await.clone();
        let permit = tokio::select! {
            _ = self.shutdown_token.cancelled() => {
                handle.state.lock().await.dispatch_active = false;
                return;
            }
            permit = gate.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    handle.state.lock().await.dispatch_active = false;
                    return;
                }
            },
        };

        let ctx = DispatchContext {
            url: entry.url,
            handle,
            cancel,
            engine: self.engine.clone(),
            history: self.history.clone(),
            event_tx: self.event_tx.clone(),
            config: self.config.clone(),
            progress_tx: self.progress_tx.clone(),
            queue_tx: self.queue_state.queue_tx.clone(),
        };

        tokio::spawn(async move {
            let _permit = permit;
            run_dispatch_cycle(ctx).await;
        });
    }
}
