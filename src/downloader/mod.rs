//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by concern:
//! - [`control`] - Submission and lifecycle control (enqueue/cancel/pause/resume)
//! - [`config_ops`] - Runtime configuration updates
//! - [`lifecycle`] - Startup and shutdown coordination
//! - [`queue_processor`] - Queue draining and admission
//! - [`dispatch`] - Per-task attempt cycle (retry, checkpoints, history)
//! - [`progress`] - Progress event aggregation

mod config_ops;
mod control;
mod dispatch;
mod lifecycle;
mod progress;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, RwLock, Semaphore, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::{DownloadEngine, ProgressEvent};
use crate::history::HistorySink;
use crate::registry::TaskRegistry;
use crate::types::Event;

/// Buffer size for the engine progress event channel
const PROGRESS_CHANNEL_BUFFER: usize = 500;

/// Buffer size for the lifecycle event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// One dispatch queue entry: a submitted URL and its destination directory
#[derive(Clone, Debug)]
pub(crate) struct QueueEntry {
    pub(crate) url: String,
    pub(crate) destination: PathBuf,
}

/// Queue and admission state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Unbounded FIFO of submissions; `enqueue` never blocks
    pub(crate) queue_tx: mpsc::UnboundedSender<QueueEntry>,
    /// Receiver half, taken once by the queue processor
    pub(crate) queue_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<QueueEntry>>>>,
    /// Admission gate bounding concurrent engine calls; replaced wholesale
    /// when the concurrency limit changes
    pub(crate) gate: Arc<RwLock<Arc<Semaphore>>>,
    /// Whether new submissions are accepted (false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
///
/// Construct with [`MediaDownloader::new`], call
/// [`start`](MediaDownloader::start) to spawn the queue processor and the
/// progress aggregator, then submit work with
/// [`enqueue`](MediaDownloader::enqueue). Poll task state with
/// [`get_task`](MediaDownloader::get_task) or subscribe to the event stream.
#[derive(Clone)]
pub struct MediaDownloader {
    /// Task registry — the single point of truth for task state
    pub(crate) registry: Arc<TaskRegistry>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Live configuration; attempts snapshot it, they never read it directly
    pub(crate) config: Arc<RwLock<Arc<Config>>>,
    /// The extraction/download engine collaborator
    pub(crate) engine: Arc<dyn DownloadEngine>,
    /// The history sink collaborator
    pub(crate) history: Arc<dyn HistorySink>,
    /// Queue and admission state
    pub(crate) queue_state: QueueState,
    /// Sender handed to the engine for each attempt
    pub(crate) progress_tx: mpsc::Sender<ProgressEvent>,
    /// Receiver half, taken once by the progress aggregator
    pub(crate) progress_rx: Arc<Mutex<Option<mpsc::Receiver<ProgressEvent>>>>,
    /// Cancels the background loops on shutdown
    pub(crate) shutdown_token: CancellationToken,
}

impl MediaDownloader {
    /// Create a new downloader around an engine and a history sink
    ///
    /// Nothing runs until [`start`](Self::start) is called; submissions made
    /// before that simply wait in the queue.
    pub fn new(config: Config, engine: Arc<dyn DownloadEngine>, history: Arc<dyn HistorySink>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_BUFFER);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        // A zero limit would starve the queue forever
        let limit = config.download.max_concurrent_downloads.max(1);

        let queue_state = QueueState {
            queue_tx,
            queue_rx: Arc::new(Mutex::new(Some(queue_rx))),
            gate: Arc::new(RwLock::new(Arc::new(Semaphore::new(limit)))),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        Self {
            registry: Arc::new(TaskRegistry::new()),
            event_tx,
            config: Arc::new(RwLock::new(Arc::new(config))),
            engine,
            history,
            queue_state,
            progress_tx,
            progress_rx: Arc::new(Mutex::new(Some(progress_rx))),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Subscribe to lifecycle events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. Events are buffered, and a subscriber that falls more
    /// than 1000 events behind receives a `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// If nobody is listening the event is silently dropped; download
    /// processing never depends on subscribers.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
