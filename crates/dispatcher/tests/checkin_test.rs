mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jobstore_core::{Clock, JobStoreError};
use jobstore_dispatcher::{CheckinErrorHandler, JobStore};
use jobstore_testing_utils::{manual_clock, FlakySchedulerRepository, TestStore};

use common::{node, store_config};

#[derive(Default)]
struct RecordingHandler {
    calls: AtomicUsize,
}

impl CheckinErrorHandler for RecordingHandler {
    fn handle(&self, error: &JobStoreError) {
        assert!(error.is_fatal());
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_check_in_upserts_membership_record() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    node.check_in().await.unwrap();
    clock.advance(chrono::Duration::seconds(5));
    node.check_in().await.unwrap();

    let records = store.repos.schedulers.find_all("test-cluster").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].instance_id, "node-a");
    assert_eq!(records[0].last_checkin, clock.now());
    assert_eq!(records[0].checkin_interval_ms, 7_500);
}

#[tokio::test]
async fn test_check_in_retries_transient_failures() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let flaky = Arc::new(FlakySchedulerRepository::new(
        Arc::clone(&store.repos.schedulers),
        2,
    ));
    let mut repos = store.repos.clone();
    repos.schedulers = flaky.clone();

    let handler = Arc::new(RecordingHandler::default());
    let node = JobStore::builder(repos, store_config("node-a"))
        .with_clock(clock.clone() as Arc<dyn Clock>)
        .with_checkin_error_handler(handler.clone())
        .build();

    node.check_in().await.unwrap();

    assert_eq!(flaky.attempts(), 3);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        store.repos.schedulers.find_all("test-cluster").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_exhausted_retries_invoke_error_handler() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let flaky = Arc::new(FlakySchedulerRepository::always_failing(Arc::clone(
        &store.repos.schedulers,
    )));
    let mut repos = store.repos.clone();
    repos.schedulers = flaky.clone();

    let handler = Arc::new(RecordingHandler::default());
    let node = JobStore::builder(repos, store_config("node-a"))
        .with_clock(clock.clone() as Arc<dyn Clock>)
        .with_checkin_error_handler(handler.clone())
        .build();

    let err = node.check_in().await.unwrap_err();

    assert!(matches!(err, JobStoreError::CheckinFailed(_)));
    assert!(err.is_fatal());
    // 首次尝试加上 checkin_max_retries 次重试
    assert_eq!(flaky.attempts(), 4);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_default_handler_signals_shutdown() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let mut repos = store.repos.clone();
    repos.schedulers = Arc::new(FlakySchedulerRepository::always_failing(Arc::clone(
        &store.repos.schedulers,
    )));

    let node = JobStore::builder(repos, store_config("node-a"))
        .with_clock(clock.clone() as Arc<dyn Clock>)
        .build();
    let mut shutdown_rx = node.subscribe_shutdown();

    assert!(node.initialize().await.is_err());
    assert!(shutdown_rx.try_recv().is_ok());
    assert!(!node.is_checkin_running().await);
}

#[tokio::test]
async fn test_initialize_starts_and_shutdown_stops_checkins() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let node = node(&store.repos, &clock, "node-a");

    let report = node.initialize().await.unwrap();
    assert!(report.is_some_and(|r| r.is_empty()));
    assert!(node.is_checkin_running().await);
    assert_eq!(
        store.repos.schedulers.find_all("test-cluster").await.unwrap().len(),
        1
    );

    node.shutdown().await;
    assert!(!node.is_checkin_running().await);
}

#[tokio::test]
async fn test_non_clustered_store_skips_membership() {
    let store = TestStore::in_memory();
    let clock = manual_clock();
    let mut config = store_config("node-a");
    config.clustered = false;
    let node = JobStore::builder(store.repos.clone(), config)
        .with_clock(clock.clone() as Arc<dyn Clock>)
        .build();

    assert!(node.initialize().await.unwrap().is_none());
    assert!(store
        .repos
        .schedulers
        .find_all("test-cluster")
        .await
        .unwrap()
        .is_empty());
}
