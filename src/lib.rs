//! # media-dl
//!
//! Embeddable download manager for remote media.
//!
//! The crate is the orchestration layer between a submission source (a UI, a
//! CLI, an API) and an extraction/download engine: it owns the task registry
//! and its state machine, a FIFO dispatch queue drained under a bounded
//! admission gate, retry with exponential backoff, cooperative cancellation,
//! and the aggregation of engine progress events into pollable task state.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Collaborators behind traits** - the engine ([`DownloadEngine`]) and
//!   history storage ([`HistorySink`]) are injected; reference adapters ship
//!   in-crate
//! - **Poll or subscribe** - task snapshots for row-polling UIs, a broadcast
//!   event stream for everything else
//! - **Nothing in flight changes course** - every attempt captures an
//!   immutable options snapshot; settings changes apply from the next
//!   attempt on
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{CommandEngine, Config, MediaDownloader, NoOpHistorySink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = CommandEngine::from_path().expect("extractor binary not found");
//!     let downloader =
//!         MediaDownloader::new(Config::default(), Arc::new(engine), Arc::new(NoOpHistorySink));
//!     downloader.start().await;
//!
//!     downloader
//!         .enqueue("https://example.com/watch?v=abc", "./downloads")
//!         .await;
//!
//!     let mut events = downloader.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Extraction/download engine seam and the command-line adapter
pub mod engine;
/// Error types
pub mod error;
/// History sink seam and adapters
pub mod history;
/// Retry budget and backoff schedule
pub mod retry;
/// Core types, snapshots, and events
pub mod types;

mod registry;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, EngineConfig, EngineOptions, RetryConfig};
pub use downloader::MediaDownloader;
pub use engine::{CommandEngine, DownloadEngine, FormatInfo, ProgressEvent};
pub use error::{EngineError, Error, Result};
pub use history::{HistorySink, NoOpHistorySink, SqliteHistorySink};
pub use retry::RetryPolicy;
pub use types::{Eta, Event, HistoryRecord, Speed, TaskSnapshot, TaskStats, TaskStatus};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's
/// [`shutdown`](MediaDownloader::shutdown) method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to Ctrl-C if
///   signal registration fails.
/// - **Windows/other:** listens for Ctrl-C.
///
/// # Example
///
/// ```no_run
/// use media_dl::{CommandEngine, Config, MediaDownloader, NoOpHistorySink, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let engine = CommandEngine::from_path().expect("extractor binary not found");
///     let downloader =
///         MediaDownloader::new(Config::default(), Arc::new(engine), Arc::new(NoOpHistorySink));
///     downloader.start().await;
///
///     run_with_shutdown(downloader).await;
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) {
    wait_for_signal().await;
    downloader.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        _ => {
            tracing::warn!("Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
    }
}
