//! Startup and shutdown coordination.

use std::sync::atomic::Ordering;

use super::MediaDownloader;
use crate::types::Event;

impl MediaDownloader {
    /// Start the background loops: the queue processor and the progress
    /// aggregator
    ///
    /// Idempotent — a second call is a logged no-op. Submissions made before
    /// `start` simply wait in the queue.
    pub async fn start(&self) {
        let queue = self.start_queue_processor().await;
        let progress = self.start_progress_aggregator().await;

        if queue.is_none() && progress.is_none() {
            tracing::warn!("start() called on an already-running downloader, ignoring");
        } else {
            tracing::info!("Downloader started");
        }
    }

    /// Initiate a graceful shutdown
    ///
    /// Stops accepting new submissions, stops the queue processor and the
    /// progress aggregator, and emits [`Event::Shutdown`]. Attempt cycles
    /// already in flight unwind cooperatively: their engine calls run to
    /// completion and their results are handled normally.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new submissions
        self.queue_state.accepting_new.store(false, Ordering::SeqCst);

        // 2. Stop the background loops
        self.shutdown_token.cancel();

        // 3. Tell subscribers
        self.emit_event(Event::Shutdown);

        tracing::info!("Shutdown complete, in-flight attempts unwind in the background");
    }
}
