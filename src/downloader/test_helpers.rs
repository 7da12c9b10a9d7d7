//! Shared test helpers: a scripted mock engine, a recording history sink,
//! and downloader fixtures.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

use crate::config::{Config, EngineOptions};
use crate::downloader::MediaDownloader;
use crate::engine::{DownloadEngine, FormatInfo, ProgressEvent};
use crate::error::{EngineError, Result};
use crate::history::HistorySink;
use crate::types::{HistoryRecord, TaskStatus};

/// One recorded `download` invocation
#[derive(Clone, Debug)]
pub(crate) struct DownloadCall {
    /// When the call started (virtual time under a paused clock)
    pub(crate) at: tokio::time::Instant,
    /// The options snapshot the call received
    pub(crate) format: String,
    pub(crate) output_template: String,
    pub(crate) url: String,
}

/// Scripted [`DownloadEngine`] double.
///
/// Clones share all counters, so tests keep one clone for inspection and
/// hand another to the downloader.
#[derive(Clone)]
pub(crate) struct MockEngine {
    calls: Arc<Mutex<Vec<DownloadCall>>>,
    format_calls: Arc<AtomicUsize>,
    current: Arc<AtomicUsize>,
    max_concurrent: Arc<AtomicUsize>,
    fail_first: Arc<AtomicUsize>,
    fail_always: bool,
    transfer_duration: Duration,
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            format_calls: Arc::new(AtomicUsize::new(0)),
            current: Arc::new(AtomicUsize::new(0)),
            max_concurrent: Arc::new(AtomicUsize::new(0)),
            fail_first: Arc::new(AtomicUsize::new(0)),
            fail_always: false,
            transfer_duration: Duration::ZERO,
        }
    }

    /// Fail the first `n` download calls, then succeed
    pub(crate) fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = Arc::new(AtomicUsize::new(n));
        self
    }

    /// Fail every download call
    pub(crate) fn fail_always(mut self) -> Self {
        self.fail_always = true;
        self
    }

    /// Make each download call take this long (in tokio time)
    pub(crate) fn transfer_duration(mut self, duration: Duration) -> Self {
        self.transfer_duration = duration;
        self
    }

    pub(crate) async fn download_calls(&self) -> Vec<DownloadCall> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn download_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    pub(crate) fn format_call_count(&self) -> usize {
        self.format_calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously-running download calls observed
    pub(crate) fn max_concurrent_seen(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownloadEngine for MockEngine {
    async fn list_formats(
        &self,
        _url: &str,
        _options: &EngineOptions,
    ) -> std::result::Result<Vec<FormatInfo>, EngineError> {
        self.format_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![FormatInfo {
            id: "18".to_string(),
            description: "18 - 640x360 (mp4)".to_string(),
        }])
    }

    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        _progress: mpsc::Sender<ProgressEvent>,
    ) -> std::result::Result<(), EngineError> {
        self.calls.lock().await.push(DownloadCall {
            at: tokio::time::Instant::now(),
            format: options.format.clone(),
            output_template: options.output_template.clone(),
            url: url.to_string(),
        });

        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(running, Ordering::SeqCst);

        if self.transfer_duration > Duration::ZERO {
            tokio::time::sleep(self.transfer_duration).await;
        }

        self.current.fetch_sub(1, Ordering::SeqCst);

        if self.fail_always {
            return Err(EngineError::Transfer("mock transfer failure".to_string()));
        }
        if self.fail_first.load(Ordering::SeqCst) > 0 {
            self.fail_first.fetch_sub(1, Ordering::SeqCst);
            return Err(EngineError::Transfer("mock transient failure".to_string()));
        }
        Ok(())
    }
}

/// History sink capturing every appended record
#[derive(Clone)]
pub(crate) struct RecordingHistorySink {
    records: Arc<Mutex<Vec<HistoryRecord>>>,
}

impl RecordingHistorySink {
    pub(crate) fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) async fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl HistorySink for RecordingHistorySink {
    async fn append(&self, record: &HistoryRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// A downloader wired to a mock engine and a recording sink
pub(crate) struct TestFixture {
    pub(crate) downloader: MediaDownloader,
    pub(crate) engine: MockEngine,
    pub(crate) history: RecordingHistorySink,
}

/// Config with a short backoff so non-timing tests run fast on a real clock
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.backoff_base = Duration::from_millis(10);
    config
}

/// Build a fixture without starting the background loops
pub(crate) fn idle_fixture(config: Config, engine: MockEngine) -> TestFixture {
    let history = RecordingHistorySink::new();
    let downloader = MediaDownloader::new(
        config,
        Arc::new(engine.clone()),
        Arc::new(history.clone()),
    );
    TestFixture {
        downloader,
        engine,
        history,
    }
}

/// Build a fixture and start the queue processor and progress aggregator
pub(crate) async fn started_fixture(config: Config, engine: MockEngine) -> TestFixture {
    let fixture = idle_fixture(config, engine);
    fixture.downloader.start().await;
    fixture
}

/// Poll until the task reaches `status`, failing after a (virtual) minute
pub(crate) async fn wait_for_status(downloader: &MediaDownloader, url: &str, status: TaskStatus) {
    let result = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Some(snapshot) = downloader.get_task(url).await
                && snapshot.status == status
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        result.is_ok(),
        "timed out waiting for {} to reach {:?}, currently {:?}",
        url,
        status,
        downloader.get_task(url).await.map(|s| s.status)
    );
}

/// Poll until the task is in any terminal state
pub(crate) async fn wait_for_terminal(downloader: &MediaDownloader, url: &str) -> TaskStatus {
    let result = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if let Some(snapshot) = downloader.get_task(url).await
                && snapshot.status.is_terminal()
            {
                return snapshot.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    match result {
        Ok(status) => status,
        Err(_) => panic!("timed out waiting for {} to reach a terminal state", url),
    }
}
