mod common;

use bucket_mirror_lib::config::{ListingFailurePolicy, ScheduleMode};
use bucket_mirror_lib::core::ScheduleConfig;
use bucket_mirror_lib::{PassOptions, Scheduler, SchedulerExit, SyncEngine};
use common::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn scheduler(
    store: &Arc<MemoryStore>,
    root: &std::path::Path,
    mode: ScheduleMode,
    policy: ListingFailurePolicy,
    max_runtime: Option<Duration>,
) -> Scheduler {
    let engine = SyncEngine::new(store.clone(), root.to_path_buf(), PassOptions::default());
    Scheduler::new(
        engine,
        ScheduleConfig {
            interval: Duration::from_millis(20),
            mode,
            on_listing_failure: policy,
            max_runtime,
        },
    )
}

#[tokio::test]
async fn repeats_passes_until_max_runtime() {
    for mode in [ScheduleMode::AfterPass, ScheduleMode::FixedRate] {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.put("a.txt", &b"abc"[..]);

        let mut passes = 0;
        let exit = scheduler(
            &store,
            root.path(),
            mode,
            ListingFailurePolicy::RetryNextTick,
            Some(Duration::from_millis(150)),
        )
        .run_observed(CancellationToken::new(), |_| passes += 1)
        .await;

        assert!(matches!(exit, SchedulerExit::MaxRuntimeReached));
        assert!(passes >= 2, "mode {:?} ran {} passes", mode, passes);
        // 只有第一次同步真正下载
        assert_eq!(store.get_calls(), 1);
    }
}

#[tokio::test]
async fn listing_failure_retries_next_tick() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.put("a.txt", &b"abc"[..]);
    store.fail_list_on_call(1);

    let mut reports = 0;
    let exit = scheduler(
        &store,
        root.path(),
        ScheduleMode::AfterPass,
        ListingFailurePolicy::RetryNextTick,
        Some(Duration::from_millis(100)),
    )
    .run_observed(CancellationToken::new(), |_| reports += 1)
    .await;

    assert!(matches!(exit, SchedulerExit::MaxRuntimeReached));
    assert!(reports >= 1);
    assert!(root.path().join("a.txt").exists());
}

#[tokio::test]
async fn listing_failure_exits_when_configured() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    store.fail_list_on_call(1);

    let exit = scheduler(
        &store,
        root.path(),
        ScheduleMode::AfterPass,
        ListingFailurePolicy::Exit,
        None,
    )
    .run(CancellationToken::new())
    .await;

    match exit {
        SchedulerExit::ListingFailed(e) => assert!(e.is_fatal()),
        other => panic!("unexpected exit: {:?}", other),
    }
    assert_eq!(store.list_calls(), 1);
}

#[tokio::test]
async fn cancellation_stops_the_loop() {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let exit = tokio::time::timeout(
        Duration::from_secs(5),
        scheduler(
            &store,
            root.path(),
            ScheduleMode::AfterPass,
            ListingFailurePolicy::RetryNextTick,
            None,
        )
        .run(cancel),
    )
    .await
    .expect("scheduler should stop after cancellation");

    assert!(matches!(exit, SchedulerExit::Cancelled));
    assert!(store.list_calls() >= 1);
}
