//! Progress aggregator — maps raw engine progress events onto task fields.
//!
//! A single consumer drains the engine progress channel, so all
//! progress-driven mutation of a task is serialized with the dispatcher
//! through the task's lock. Each event's field group is applied under one
//! lock acquisition; a poller can never observe half of an update.

use std::path::Path;
use tokio::task::JoinHandle;

use super::MediaDownloader;
use crate::engine::ProgressEvent;
use crate::types::{Eta, Event, Speed};

impl MediaDownloader {
    /// Start the progress aggregator task
    ///
    /// Returns `None` when the aggregator is already running.
    pub async fn start_progress_aggregator(&self) -> Option<JoinHandle<()>> {
        let mut progress_rx = self.progress_rx.lock().await.take()?;
        let downloader = self.clone();

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = downloader.shutdown_token.cancelled() => break,
                    event = progress_rx.recv() => match event {
                        Some(event) => downloader.apply_progress_event(event).await,
                        None => break,
                    },
                }
            }
            tracing::debug!("Progress aggregator stopped");
        }))
    }

    /// Apply one engine progress event to its task
    ///
    /// Events for unknown URLs are silently ignored, as are events arriving
    /// for a task already in a terminal state (late emissions from an
    /// attempt that lost a cancellation race).
    pub(crate) async fn apply_progress_event(&self, event: ProgressEvent) {
        let Some(handle) = self.registry.get(event.url()).await else {
            tracing::debug!(url = %event.url(), "Progress event for unknown task, ignoring");
            return;
        };

        let update = {
            let mut state = handle.state.lock().await;
            if state.status.is_terminal() {
                return;
            }

            match event {
                ProgressEvent::Downloading {
                    downloaded_bytes,
                    total_bytes,
                    total_bytes_estimate,
                    speed_bps,
                    eta_seconds,
                    filename,
                    ..
                } => {
                    // Percent needs a denominator: the exact total wins,
                    // the estimate fills in, otherwise progress stays put
                    if let Some(total) = total_bytes.or(total_bytes_estimate).filter(|t| *t > 0) {
                        state.total_bytes = total;
                        state.downloaded_bytes = downloaded_bytes;
                        let percent = (downloaded_bytes as f32 / total as f32) * 100.0;
                        // Monotonic while downloading
                        state.progress = state.progress.max(percent.clamp(0.0, 100.0));
                    }
                    state.speed = speed_bps.map(Speed::BytesPerSec).unwrap_or(Speed::Computing);
                    state.eta = eta_seconds.map(Eta::from_seconds).unwrap_or(Eta::Computing);
                    if let Some(path) = filename {
                        state.filename = file_basename(&path);
                    }
                    (state.progress, speed_bps)
                }
                ProgressEvent::Finished {
                    filename,
                    total_bytes,
                    ..
                } => {
                    state.progress = 100.0;
                    state.speed = Speed::Done;
                    state.eta = Eta::Done;
                    if let Some(total) = total_bytes.filter(|t| *t > 0) {
                        state.total_bytes = total;
                        state.downloaded_bytes = total;
                    }
                    if let Some(path) = filename {
                        state.filename = file_basename(&path);
                    }
                    (100.0, None)
                }
            }
        };

        let (percent, speed_bps) = update;
        self.emit_event(Event::Progress {
            url: handle.url.clone(),
            percent,
            speed_bps,
        });
    }
}

/// Basename of an engine-resolved output path, for display
fn file_basename(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}
