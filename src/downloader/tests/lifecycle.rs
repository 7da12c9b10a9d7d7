use crate::config::Config;
use crate::downloader::test_helpers::{
    MockEngine, started_fixture, test_config, wait_for_status,
};
use crate::types::{Event, TaskStatus};
use std::time::Duration;

const URL: &str = "https://example.com/watch?v=abc";

#[tokio::test]
async fn test_start_twice_is_harmless() {
    let fixture = started_fixture(test_config(), MockEngine::new()).await;

    // Second start must not steal or break the running loops
    fixture.downloader.start().await;

    fixture.downloader.enqueue(URL, "/downloads").await;
    wait_for_status(&fixture.downloader, URL, TaskStatus::Completed).await;
}

#[tokio::test]
async fn test_shutdown_emits_event_and_rejects_new_submissions() {
    let fixture = started_fixture(test_config(), MockEngine::new()).await;
    let mut events = fixture.downloader.subscribe();

    fixture.downloader.shutdown().await;

    let received = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match events.recv().await {
                Ok(Event::Shutdown) => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
    .await
    .expect("timed out waiting for Shutdown event");
    assert!(received);

    fixture.downloader.enqueue(URL, "/downloads").await;
    assert!(
        fixture.downloader.get_task(URL).await.is_none(),
        "submissions after shutdown are dropped without creating tasks"
    );
    assert_eq!(fixture.engine.download_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_inflight_attempt_finishes_after_shutdown() {
    let engine = MockEngine::new().transfer_duration(Duration::from_secs(2));
    let fixture = started_fixture(Config::default(), engine).await;

    fixture.downloader.enqueue(URL, "/downloads").await;
    wait_for_status(&fixture.downloader, URL, TaskStatus::Downloading).await;

    fixture.downloader.shutdown().await;

    // The cycle already owns its permit and unwinds cooperatively
    wait_for_status(&fixture.downloader, URL, TaskStatus::Completed).await;
    assert_eq!(fixture.history.records().await.len(), 1);
}
