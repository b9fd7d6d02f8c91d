//! Durability and delivery guarantees of the location queue.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use captur_core::LocationFix;
use captur_sync::{
    start_periodic_sync, DurableLocationLogger, FileStore, KeyValueStore, LogOutcome, MemoryStore,
    DEBUG_OFFLINE_KEY, PENDING_PREFIX,
};
use common::{CrashingStore, FakeBackend};

fn fix(lat: f64, lng: f64) -> LocationFix {
    LocationFix::new(lat, lng).expect("valid test fix")
}

#[tokio::test]
async fn online_fix_is_persisted_without_queuing() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(MemoryStore::new());
    let logger = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));

    let outcome = logger.log_fix(&fix(40.4, -3.7).with_speed(Some(2.5))).await;

    assert_eq!(outcome, LogOutcome::Persisted);
    assert!(store.is_empty().await);
    let rows = backend.inserted();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, Some(backend.user));
    assert_eq!(rows[0].speed, Some(2.5));
}

#[tokio::test]
async fn failed_write_queues_one_record_and_sync_removes_only_it() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(MemoryStore::new());
    let logger = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));

    // One record the backend will keep rejecting, and an unrelated setting.
    *backend.reject_latitude.lock().unwrap() = Some(10.0);
    backend.set_offline(true);
    logger.log_fix(&fix(10.0, 10.0)).await;
    store.set("appSettings:theme", "dark").await.unwrap();
    let before = logger.pending_keys().await.unwrap();
    assert_eq!(before.len(), 1);

    let outcome = logger.log_fix(&fix(40.4, -3.7)).await;
    let LogOutcome::Queued { key } = outcome else {
        panic!("expected the fix to be queued, got {outcome:?}");
    };
    let after = logger.pending_keys().await.unwrap();
    assert_eq!(after.len(), 2, "exactly one new durable record");
    assert!(after.contains(&key));

    backend.set_offline(false);
    let report = logger.sync_pending().await;

    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(logger.pending_keys().await.unwrap(), before);
    assert_eq!(
        store.get("appSettings:theme").await.unwrap().as_deref(),
        Some("dark")
    );
    let rows = backend.inserted();
    assert_eq!(rows.len(), 1);
    assert!((rows[0].latitude - 40.4).abs() < f64::EPSILON);
}

#[tokio::test]
async fn crash_before_dequeue_redelivers_without_loss() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(CrashingStore::default());
    let logger = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));

    backend.set_offline(true);
    for i in 0..3 {
        logger.log_fix(&fix(40.0 + f64::from(i) * 0.001, -3.7)).await;
    }
    backend.set_offline(false);

    // Inserts succeed but every dequeue is lost.
    store.fail_deletes.store(true, Ordering::SeqCst);
    let first = logger.sync_pending().await;
    assert_eq!(first.synced, 3);
    assert_eq!(logger.pending_keys().await.unwrap().len(), 3);

    // After restart the next pass must not error and must drain the queue.
    store.fail_deletes.store(false, Ordering::SeqCst);
    let restarted = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));
    let second = restarted.sync_pending().await;

    assert!(second.is_complete());
    assert!(restarted.pending_keys().await.unwrap().is_empty());
    // Duplicates are accepted; every record arrived at least once.
    assert_eq!(backend.inserted().len(), 6);
}

#[tokio::test]
async fn debug_offline_flag_skips_the_remote_attempt() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(MemoryStore::new());
    let logger = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));

    logger.set_debug_offline(true).await.unwrap();
    assert!(logger.debug_offline().await);
    assert_eq!(
        store.get(DEBUG_OFFLINE_KEY).await.unwrap().as_deref(),
        Some("true")
    );

    let outcome = logger.log_fix(&fix(40.4, -3.7)).await;
    assert!(matches!(outcome, LogOutcome::Queued { .. }));
    assert!(backend.inserted().is_empty());

    logger.set_debug_offline(false).await.unwrap();
    assert_eq!(logger.log_fix(&fix(40.4, -3.7)).await, LogOutcome::Persisted);
}

#[tokio::test]
async fn records_queued_before_sign_in_get_the_user_at_sync() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(MemoryStore::new());
    let logger = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));

    backend.signed_out.store(true, Ordering::SeqCst);
    logger.log_fix(&fix(40.4, -3.7)).await;
    assert!(logger.cached_user().is_none());

    // Still unknown: the record stays queued.
    let blocked = logger.sync_pending().await;
    assert_eq!(blocked.failed, 1);

    backend.signed_out.store(false, Ordering::SeqCst);
    let report = logger.sync_pending().await;
    assert_eq!(report.synced, 1);
    assert_eq!(backend.inserted()[0].user_id, Some(backend.user));
}

#[tokio::test]
async fn unreadable_records_are_discarded() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(MemoryStore::new());
    let logger = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));

    store
        .set(&format!("{PENDING_PREFIX}garbage"), "{not json")
        .await
        .unwrap();
    let report = logger.sync_pending().await;

    assert_eq!(report.discarded, 1);
    assert!(report.is_complete());
    assert!(logger.pending_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn foreground_and_background_handles_never_overwrite_each_other() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(MemoryStore::new());
    let foreground = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));
    let background = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));
    backend.set_offline(true);

    let fg_fixes: Vec<LocationFix> = (0..20).map(|i| fix(40.0, -3.0 + f64::from(i) * 1e-4)).collect();
    let bg_fixes: Vec<LocationFix> = (0..20).map(|i| fix(41.0, -3.0 + f64::from(i) * 1e-4)).collect();
    let (fg, bg) = futures::future::join(
        foreground.log_batch(&fg_fixes),
        background.log_batch(&bg_fixes),
    )
    .await;

    assert!(fg.iter().chain(&bg).all(LogOutcome::is_durable));
    assert_eq!(foreground.pending_keys().await.unwrap().len(), 40);
}

#[tokio::test]
async fn overlapping_sync_passes_and_logging_lose_nothing() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(MemoryStore::new());
    let foreground = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));
    let background = DurableLocationLogger::new(Arc::clone(&backend), Arc::clone(&store));

    backend.set_offline(true);
    let queued: Vec<LocationFix> = (0..10).map(|i| fix(40.0 + f64::from(i) * 1e-3, -3.7)).collect();
    foreground.log_batch(&queued).await;
    backend.set_offline(false);
    // Keeps the concurrent fix queued so it races the sync passes.
    foreground.set_debug_offline(true).await.unwrap();

    let late = fix(45.0, -3.7);
    let (first, second, logged) = futures::join!(
        foreground.sync_pending(),
        background.sync_pending(),
        foreground.log_fix(&late),
    );

    assert!(logged.is_durable());
    for report in [&first, &second] {
        assert_eq!(report.failed, 0, "{report:?}");
        assert_eq!(report.discarded, 0, "{report:?}");
    }
    assert!(first.synced + second.synced >= queued.len());

    let drain = background.sync_pending().await;
    assert_eq!(drain.failed, 0);
    assert!(background.pending_keys().await.unwrap().is_empty());

    let inserted = backend.inserted();
    for expected in queued.iter().chain(std::iter::once(&late)) {
        assert!(
            inserted.iter().any(|row| (row.latitude - expected.latitude).abs() < f64::EPSILON),
            "fix at {} never reached the backend",
            expected.latitude
        );
    }
}

#[tokio::test]
async fn file_backed_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FakeBackend::new());
    backend.set_offline(true);
    {
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let logger = DurableLocationLogger::new(Arc::clone(&backend), store);
        logger.log_fix(&fix(40.4, -3.7)).await;
        logger.log_fix(&fix(40.5, -3.7)).await;
    }

    backend.set_offline(false);
    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let logger = DurableLocationLogger::new(Arc::clone(&backend), store);
    assert_eq!(logger.pending_keys().await.unwrap().len(), 2);

    let report = logger.sync_pending().await;
    assert_eq!(report.synced, 2);
    assert!(logger.pending_keys().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_sync_drains_the_queue() {
    let backend = Arc::new(FakeBackend::new());
    let store = Arc::new(MemoryStore::new());
    let logger = Arc::new(DurableLocationLogger::new(
        Arc::clone(&backend),
        Arc::clone(&store),
    ));
    backend.set_offline(true);
    logger.log_fix(&fix(40.4, -3.7)).await;
    backend.set_offline(false);

    let mut scheduler = start_periodic_sync(Arc::clone(&logger), Duration::from_secs(1))
        .await
        .expect("scheduler starts");

    let mut drained = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if logger.pending_keys().await.unwrap().is_empty() {
            drained = true;
            break;
        }
    }
    scheduler.shutdown().await.unwrap();

    assert!(drained, "queue was not drained by the periodic job");
    assert_eq!(backend.inserted().len(), 1);
}
