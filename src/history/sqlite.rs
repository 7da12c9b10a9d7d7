//! SQLite-backed history sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};

use super::HistorySink;
use crate::error::Result;
use crate::types::{HistoryRecord, TaskStatus};

/// History sink backed by a single-table SQLite database
///
/// Records are keyed by URL with insert-or-replace semantics: re-running a
/// URL overwrites its previous record, so the table holds the latest outcome
/// per URL. Read-side helpers ([`recent`](Self::recent),
/// [`clear`](Self::clear)) exist for embedding UIs — the orchestration core
/// itself never reads history.
pub struct SqliteHistorySink {
    pool: SqlitePool,
}

/// Raw history row; timestamps are RFC 3339 text
#[derive(Debug, Clone, FromRow)]
struct HistoryRow {
    url: String,
    filename: Option<String>,
    destination: String,
    start_time: String,
    end_time: Option<String>,
    status: String,
    error_message: Option<String>,
    file_size: i64,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = chrono::ParseError;

    fn try_from(row: HistoryRow) -> std::result::Result<Self, Self::Error> {
        let start_time = parse_timestamp(&row.start_time)?;
        let end_time = match row.end_time {
            Some(raw) => Some(parse_timestamp(&raw)?),
            None => None,
        };
        Ok(HistoryRecord {
            url: row.url,
            filename: row.filename,
            destination: PathBuf::from(row.destination),
            start_time,
            end_time,
            status: status_from_str(&row.status),
            error_message: row.error_message,
            file_size: row.file_size.max(0) as u64,
        })
    }
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Decode a stored status string; unknown values surface as `Error` so
/// corrupted rows stay visible rather than masquerading as successes
fn status_from_str(raw: &str) -> TaskStatus {
    match raw {
        "pending" => TaskStatus::Pending,
        "downloading" => TaskStatus::Downloading,
        "completed" => TaskStatus::Completed,
        "paused" => TaskStatus::Paused,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Error,
    }
}

impl SqliteHistorySink {
    /// Open (or create) the history database at `path`
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        use sqlx::sqlite::SqliteConnectOptions;
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                url TEXT PRIMARY KEY,
                filename TEXT,
                destination TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                file_size INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Most recent records, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT url, filename, destination, start_time, end_time,
                   status, error_message, file_size
            FROM downloads
            ORDER BY start_time DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match HistoryRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping history row with unparseable timestamp");
                    None
                }
            })
            .collect())
    }

    /// Delete all history records
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM downloads").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HistorySink for SqliteHistorySink {
    async fn append(&self, record: &HistoryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO downloads
                (url, filename, destination, start_time, end_time,
                 status, error_message, file_size)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.url)
        .bind(&record.filename)
        .bind(record.destination.to_string_lossy().into_owned())
        .bind(record.start_time.to_rfc3339())
        .bind(record.end_time.map(|t| t.to_rfc3339()))
        .bind(record.status.to_string())
        .bind(&record.error_message)
        .bind(record.file_size as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(url: &str, status: TaskStatus) -> HistoryRecord {
        HistoryRecord {
            url: url.to_string(),
            filename: Some("video.mp4".to_string()),
            destination: PathBuf::from("/downloads"),
            start_time: Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
            end_time: Some(Utc.with_ymd_and_hms(2026, 8, 1, 12, 5, 0).unwrap()),
            status,
            error_message: None,
            file_size: 4096,
        }
    }

    async fn open_sink() -> (SqliteHistorySink, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteHistorySink::new(&dir.path().join("history.db"))
            .await
            .unwrap();
        (sink, dir)
    }

    #[tokio::test]
    async fn append_then_recent_round_trips() {
        let (sink, _dir) = open_sink().await;

        sink.append(&record("https://a.example/1", TaskStatus::Completed))
            .await
            .unwrap();

        let records = sink.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://a.example/1");
        assert_eq!(records[0].status, TaskStatus::Completed);
        assert_eq!(records[0].filename.as_deref(), Some("video.mp4"));
        assert_eq!(records[0].file_size, 4096);
        assert_eq!(
            records[0].start_time,
            Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn same_url_replaces_previous_record() {
        let (sink, _dir) = open_sink().await;

        sink.append(&record("https://a.example/1", TaskStatus::Error))
            .await
            .unwrap();
        sink.append(&record("https://a.example/1", TaskStatus::Completed))
            .await
            .unwrap();

        let records = sink.recent(10).await.unwrap();
        assert_eq!(records.len(), 1, "url is the primary key, latest outcome wins");
        assert_eq!(records[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn cancelled_record_keeps_empty_end_time() {
        let (sink, _dir) = open_sink().await;

        let mut cancelled = record("https://a.example/1", TaskStatus::Cancelled);
        cancelled.end_time = None;
        sink.append(&cancelled).await.unwrap();

        let records = sink.recent(10).await.unwrap();
        assert!(records[0].end_time.is_none());
    }

    #[tokio::test]
    async fn recent_orders_newest_first_and_honors_limit() {
        let (sink, _dir) = open_sink().await;

        for i in 0..5 {
            let mut r = record(&format!("https://a.example/{}", i), TaskStatus::Completed);
            r.start_time = Utc.with_ymd_and_hms(2026, 8, 1, 12, i, 0).unwrap();
            sink.append(&r).await.unwrap();
        }

        let records = sink.recent(3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].url, "https://a.example/4");
        assert_eq!(records[2].url, "https://a.example/2");
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let (sink, _dir) = open_sink().await;

        sink.append(&record("https://a.example/1", TaskStatus::Completed))
            .await
            .unwrap();
        sink.append(&record("https://a.example/2", TaskStatus::Error))
            .await
            .unwrap();

        let removed = sink.clear().await.unwrap();
        assert_eq!(removed, 2);
        assert!(sink.recent(10).await.unwrap().is_empty());
    }

    #[test]
    fn unknown_status_string_decodes_to_error() {
        assert_eq!(status_from_str("completed"), TaskStatus::Completed);
        assert_eq!(status_from_str("totally-bogus"), TaskStatus::Error);
    }
}
