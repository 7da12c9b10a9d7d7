//! No-op history sink for callers without persistence

use async_trait::async_trait;

use super::HistorySink;
use crate::error::Result;
use crate::types::HistoryRecord;

/// History sink that discards every record
///
/// The default for tests and for embedders that track completion through
/// the event stream instead of a store.
pub struct NoOpHistorySink;

#[async_trait]
impl HistorySink for NoOpHistorySink {
    async fn append(&self, record: &HistoryRecord) -> Result<()> {
        tracing::debug!(url = %record.url, status = %record.status, "History record discarded");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
