//! Runtime configuration updates.

use std::sync::Arc;
use tokio::sync::Semaphore;

use super::MediaDownloader;
use crate::config::Config;
use crate::types::Event;

impl MediaDownloader {
    /// Replace the live configuration
    ///
    /// Takes effect for the *next* attempt and the *next* admission: every
    /// attempt snapshots its options at start, so nothing already in flight
    /// changes course. When the concurrency limit changes, a new admission
    /// gate is installed; permits held by running attempts drain against the
    /// old gate and are unaffected.
    pub async fn update_config(&self, new_config: Config) {
        let new_limit = new_config.download.max_concurrent_downloads.max(1);

        let old_limit = {
            let mut current = self.config.write().await;
            let old_limit = current.download.max_concurrent_downloads.max(1);
            *current = Arc::new(new_config);
            old_limit
        };

        if new_limit != old_limit {
            {
                let mut gate = self.queue_state.gate.write().await;
                *gate = Arc::new(Semaphore::new(new_limit));
            }
            self.emit_event(Event::ConcurrencyChanged { limit: new_limit });
            tracing::info!(old_limit, new_limit, "Concurrency limit changed");
        }

        tracing::debug!("Configuration updated");
    }

    /// Get the current configuration
    ///
    /// The configuration is behind an `Arc`, so this is a cheap clone.
    pub async fn config(&self) -> Arc<Config> {
        self.config.read().await.clone()
    }
}
