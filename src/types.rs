//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Download task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Queued and waiting to be dispatched
    Pending,
    /// An attempt is currently running
    Downloading,
    /// Successfully completed (terminal)
    Completed,
    /// Failed after the retry budget was exhausted (terminal)
    Error,
    /// Paused by user (display only — does not gate the dispatcher)
    Paused,
    /// Cancelled by user (terminal)
    Cancelled,
}

impl TaskStatus {
    /// Returns true for states that no task ever leaves without a fresh enqueue
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Paused => "paused",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Instantaneous transfer speed as reported by the engine
///
/// The engine does not always have a measurement ready (the first progress
/// events of a transfer typically carry none), so the "still computing" and
/// "transfer finished" sentinels are first-class variants rather than magic
/// numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    /// No measurement available yet
    Computing,
    /// Measured rate in bytes per second
    BytesPerSec(u64),
    /// Transfer finished, rate no longer meaningful
    Done,
}

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speed::Computing => write!(f, "computing..."),
            Speed::BytesPerSec(bps) => {
                write!(f, "{:.1} MB/s", *bps as f64 / 1024.0 / 1024.0)
            }
            Speed::Done => write!(f, "done"),
        }
    }
}

/// Estimated time remaining, decomposed for display
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eta {
    /// No estimate available yet
    Computing,
    /// Estimated remaining time
    Remaining {
        /// Whole minutes remaining
        minutes: u64,
        /// Seconds remaining after the minutes
        seconds: u64,
    },
    /// Transfer finished
    Done,
}

impl Eta {
    /// Decompose a seconds-remaining figure into minutes and seconds
    pub fn from_seconds(secs: u64) -> Self {
        Eta::Remaining {
            minutes: secs / 60,
            seconds: secs % 60,
        }
    }
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eta::Computing => write!(f, "computing..."),
            Eta::Remaining { minutes, seconds } => write!(f, "{}m {}s", minutes, seconds),
            Eta::Done => write!(f, "0s"),
        }
    }
}

/// Read-only view of a task, built atomically under the task's lock
///
/// This is what pollers (typically a UI refreshing its rows) receive from
/// [`crate::MediaDownloader::get_task`]. It is a plain clone of the task's
/// fields at one instant; holding it does not pin the task in any way.
#[derive(Clone, Debug, Serialize)]
pub struct TaskSnapshot {
    /// The task's URL — unique key in the registry
    pub url: String,

    /// Target directory, fixed at task creation
    pub destination: PathBuf,

    /// Current status
    pub status: TaskStatus,

    /// Progress percentage (0.0 to 100.0), monotonically non-decreasing
    /// while downloading
    pub progress: f32,

    /// Bytes transferred so far
    pub downloaded_bytes: u64,

    /// Total size in bytes (0 until the engine reports it)
    pub total_bytes: u64,

    /// Instantaneous transfer speed
    pub speed: Speed,

    /// Estimated time remaining
    pub eta: Eta,

    /// Resolved output filename, once the engine reports one
    pub filename: Option<String>,

    /// Final failure description (set only when status is `Error`)
    pub error_message: Option<String>,

    /// When the first attempt of the current dispatch sequence began
    pub start_time: Option<DateTime<Utc>>,

    /// Attempt number of the current dispatch sequence (0 before dispatch)
    pub attempt: u32,
}

/// Aggregate task counts by status
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct TaskStats {
    /// Total number of tasks in the registry
    pub total: usize,
    /// Tasks waiting to be dispatched
    pub pending: usize,
    /// Tasks currently downloading
    pub downloading: usize,
    /// Tasks paused for display
    pub paused: usize,
    /// Successfully completed tasks
    pub completed: usize,
    /// Failed tasks
    pub error: usize,
    /// Cancelled tasks
    pub cancelled: usize,
}

/// Event emitted during the task lifecycle
///
/// Delivered over the broadcast channel returned by
/// [`crate::MediaDownloader::subscribe`]. Emission is fire-and-forget: a
/// lagging or absent subscriber never affects the core.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task added to the dispatch queue
    Queued {
        /// Task URL
        url: String,
    },

    /// An attempt started for a task
    Started {
        /// Task URL
        url: String,
        /// Attempt number (1-based)
        attempt: u32,
    },

    /// Progress update from the aggregator
    Progress {
        /// Task URL
        url: String,
        /// Progress percentage (0.0 to 100.0)
        percent: f32,
        /// Measured speed in bytes per second, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        speed_bps: Option<u64>,
    },

    /// An attempt failed and a retry is scheduled
    Retrying {
        /// Task URL
        url: String,
        /// The attempt that just failed (1-based)
        attempt: u32,
        /// Backoff delay before the next attempt, in seconds
        delay_secs: u64,
    },

    /// Task completed successfully
    Completed {
        /// Task URL
        url: String,
        /// Resolved output filename, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// Task failed after exhausting the retry budget
    Failed {
        /// Task URL
        url: String,
        /// The final attempt's failure description
        error: String,
    },

    /// Task cancelled
    Cancelled {
        /// Task URL
        url: String,
    },

    /// Task paused (display only)
    Paused {
        /// Task URL
        url: String,
    },

    /// Task resumed to pending (display only)
    Resumed {
        /// Task URL
        url: String,
    },

    /// Admission gate capacity changed
    ConcurrencyChanged {
        /// New maximum number of concurrent downloads
        limit: usize,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Record emitted to the history sink on every terminal transition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Task URL
    pub url: String,

    /// Resolved output filename, when known
    pub filename: Option<String>,

    /// Target directory
    pub destination: PathBuf,

    /// When the first attempt began
    pub start_time: DateTime<Utc>,

    /// When the terminal transition happened (absent for cancellations)
    pub end_time: Option<DateTime<Utc>>,

    /// Terminal status (`Completed`, `Error`, or `Cancelled`)
    pub status: TaskStatus,

    /// Failure description for `Error` records
    pub error_message: Option<String>,

    /// Transferred size in bytes
    pub file_size: u64,
}
