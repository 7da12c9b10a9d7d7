//! History sink seam
//!
//! On every terminal transition the dispatcher emits one
//! [`HistoryRecord`](crate::types::HistoryRecord) to a sink. The core only
//! appends; it never reads history back. Storage formats and schemas belong
//! to the sink implementation — [`SqliteHistorySink`] mirrors the original
//! sqlite store, [`NoOpHistorySink`] discards records.

mod noop;
mod sqlite;

pub use noop::NoOpHistorySink;
pub use sqlite::SqliteHistorySink;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::HistoryRecord;

/// Append-only destination for terminal-transition records
///
/// A sink failure never affects the task that produced the record: the
/// dispatcher logs the error and moves on.
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Append one record
    async fn append(&self, record: &HistoryRecord) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
