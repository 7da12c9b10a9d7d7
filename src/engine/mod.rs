//! Extraction/download engine seam
//!
//! The engine is an external collaborator: given a URL and an options
//! snapshot it performs format discovery and the actual transfer, reporting
//! progress as a stream of [`ProgressEvent`]s. The core never parses remote
//! sites or moves bytes itself — it only drives this trait and consumes its
//! events.
//!
//! [`CommandEngine`] is the shipped reference implementation, wrapping an
//! external extractor binary. Tests inject scripted implementations.

mod command;

pub use command::CommandEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::config::EngineOptions;
use crate::error::EngineError;

/// One available format for a URL, as discovered by the engine
///
/// Format listings are informational: the dispatcher logs them but never
/// acts on the result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Engine-specific format identifier
    pub id: String,
    /// Human-readable description
    pub description: String,
}

/// Progress event emitted by the engine, tagged with the originating URL
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// Bytes are flowing for a transfer
    Downloading {
        /// The URL this event belongs to
        url: String,
        /// Bytes transferred so far
        downloaded_bytes: u64,
        /// Exact total size, when the engine knows it
        total_bytes: Option<u64>,
        /// Estimated total size, used when the exact total is unknown
        total_bytes_estimate: Option<u64>,
        /// Instantaneous rate in bytes per second, when measured
        speed_bps: Option<u64>,
        /// Seconds remaining, when estimated
        eta_seconds: Option<u64>,
        /// Output path the engine resolved for this transfer
        filename: Option<PathBuf>,
    },
    /// A transfer finished writing its output
    Finished {
        /// The URL this event belongs to
        url: String,
        /// Output path the engine resolved for this transfer
        filename: Option<PathBuf>,
        /// Final size in bytes, when known
        total_bytes: Option<u64>,
    },
}

impl ProgressEvent {
    /// The URL this event is tagged with
    pub fn url(&self) -> &str {
        match self {
            ProgressEvent::Downloading { url, .. } | ProgressEvent::Finished { url, .. } => url,
        }
    }
}

/// Abstraction over the extraction/download engine, enabling testability
///
/// One `download` call corresponds to one attempt: it is awaited to
/// completion by the dispatcher, which treats any [`EngineError`] as a
/// transient failure to retry. Progress events are pushed into the provided
/// channel and consumed by the progress aggregator; an engine should simply
/// drop events if the channel is closed.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Enumerate the formats available for a URL (best-effort)
    async fn list_formats(
        &self,
        url: &str,
        options: &EngineOptions,
    ) -> std::result::Result<Vec<FormatInfo>, EngineError>;

    /// Perform the transfer for one attempt, reporting progress through
    /// `progress`
    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> std::result::Result<(), EngineError>;
}
