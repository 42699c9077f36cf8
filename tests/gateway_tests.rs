use std::sync::Arc;
use std::time::Duration;
use tallystore::{
    Bounds, Connectivity, InMemoryRemote, LoadSource, LocalCache, MemoryCache, Notice,
    PendingReason, PersistOutcome, PersistenceGateway, ReconcileOutcome, RetryPolicy,
    StoreConfig, StoreError, ValueSnapshot, ValueStore,
};
use tallystore::gateway::Tier;
use tempfile::tempdir;

struct Fixture {
    remote: Arc<InMemoryRemote>,
    cache: Arc<MemoryCache>,
    connectivity: Connectivity,
    gateway: Arc<PersistenceGateway>,
}

fn fixture(config: StoreConfig, online: bool) -> Fixture {
    let remote = Arc::new(InMemoryRemote::new(config.bounds));
    let cache = Arc::new(MemoryCache::new());
    let connectivity = Connectivity::new(online);
    let gateway = Arc::new(PersistenceGateway::new(
        config,
        remote.clone(),
        cache.clone(),
        connectivity.clone(),
    ));
    Fixture {
        remote,
        cache,
        connectivity,
        gateway,
    }
}

fn drain(notices: &mut tokio::sync::broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut seen = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        seen.push(notice);
    }
    seen
}

#[tokio::test]
async fn offline_persist_writes_cache_and_reports_pending() {
    let fx = fixture(StoreConfig::new(), false);
    let mut notices = fx.gateway.notices();

    let outcome = fx.gateway.persist(ValueSnapshot::new(42, 0)).await;

    assert_eq!(
        outcome,
        PersistOutcome::PendingSync {
            snapshot: outcome.snapshot().clone(),
            reason: PendingReason::Offline,
        }
    );
    assert_eq!(fx.cache.write_count("counter"), 1);
    assert_eq!(fx.gateway.read_cached_snapshot().unwrap().value, 42);
    assert_eq!(fx.remote.call_count(), 0);
    assert!(drain(&mut notices).contains(&Notice::PendingSync { value: 42 }));
}

#[tokio::test]
async fn load_discards_out_of_bounds_cache() {
    let fx = fixture(StoreConfig::new(), false);
    fx.cache.seed(
        "counter",
        br#"{"value": 1000001, "timestamp": "2024-03-01T10:00:00Z", "version": 4}"#,
    );
    let mut notices = fx.gateway.notices();

    let loaded = fx.gateway.load().await;

    assert_eq!(loaded.source, LoadSource::Default);
    assert_eq!(loaded.snapshot.value, 0);
    assert_eq!(loaded.snapshot.version, 0);
    assert!(drain(&mut notices).contains(&Notice::DiscardedMalformed {
        source: Tier::Cache
    }));
}

#[tokio::test]
async fn load_prefers_remote_and_refreshes_cache() {
    let fx = fixture(StoreConfig::new(), true);
    fx.cache.seed(
        "counter",
        br#"{"value": 1, "timestamp": "2024-03-01T10:00:00Z", "version": 1}"#,
    );
    fx.remote.set_current(Some(ValueSnapshot::new(8, 5)));

    let loaded = fx.gateway.load().await;

    assert_eq!(loaded.source, LoadSource::Remote);
    assert_eq!(loaded.snapshot.value, 8);
    assert_eq!(fx.gateway.read_cached_snapshot().unwrap().version, 5);
}

#[tokio::test(start_paused = true)]
async fn load_retries_remote_reads_then_falls_back_to_cache() {
    let config = StoreConfig::new().read_retry(RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 100,
        max_backoff_ms: 1_000,
    });
    let fx = fixture(config, true);
    fx.cache.seed(
        "counter",
        br#"{"value": -3, "timestamp": "2024-03-01T10:00:00Z", "version": 2}"#,
    );
    fx.remote.set_failing(true);

    let loaded = fx.gateway.load().await;

    assert_eq!(fx.remote.fetch_count(), 3);
    assert_eq!(loaded.source, LoadSource::Cache);
    assert_eq!(loaded.snapshot.value, -3);
}

#[tokio::test(start_paused = true)]
async fn slow_remote_save_times_out_without_retry() {
    let config = StoreConfig::new().remote_timeout(Duration::from_millis(100));
    let fx = fixture(config, true);
    fx.remote.set_delay(Duration::from_secs(5));

    let outcome = fx.gateway.persist(ValueSnapshot::new(3, 0)).await;

    match outcome {
        PersistOutcome::PendingSync {
            reason: PendingReason::Remote(StoreError::RemoteUnavailable(_)),
            snapshot,
        } => assert_eq!(snapshot.value, 3),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(fx.remote.save_count(), 1);
    assert_eq!(fx.gateway.read_cached_snapshot().unwrap().value, 3);
}

#[tokio::test]
async fn synced_even_when_cache_fails_after_remote_success() {
    let fx = fixture(StoreConfig::new(), true);
    fx.cache.set_fail_writes(true);
    let mut notices = fx.gateway.notices();

    let outcome = fx.gateway.persist(ValueSnapshot::new(9, 0)).await;
    fx.gateway.persist(ValueSnapshot::new(10, 0)).await;

    assert!(outcome.is_synced());
    assert_eq!(outcome.snapshot().version, 1);
    let degraded = drain(&mut notices)
        .into_iter()
        .filter(|n| matches!(n, Notice::DurabilityDegraded { .. }))
        .count();
    assert_eq!(degraded, 1);
}

#[tokio::test]
async fn reconcile_remote_wins_higher_version_and_ties() {
    let fx = fixture(StoreConfig::new(), true);
    let store = Arc::new(ValueStore::new(Bounds::default(), ValueSnapshot::new(1, 3)).unwrap());
    fx.gateway.bind_store(store.clone());

    fx.remote.set_current(Some(ValueSnapshot::new(7, 3)));
    let outcome = fx.gateway.reconcile().await;
    assert!(matches!(outcome, ReconcileOutcome::RemoteAdopted(_)));
    assert_eq!(store.snapshot().value, 7);

    fx.remote.set_current(Some(ValueSnapshot::new(11, 6)));
    fx.gateway.reconcile().await;
    assert_eq!(store.snapshot().value, 11);
    assert_eq!(store.snapshot().version, 6);
    assert_eq!(fx.gateway.read_cached_snapshot().unwrap().version, 6);
}

#[tokio::test]
async fn reconcile_pushes_pending_local_edits() {
    let fx = fixture(StoreConfig::new(), false);
    let store = Arc::new(ValueStore::new(Bounds::default(), ValueSnapshot::new(2, 2)).unwrap());
    fx.gateway.bind_store(store.clone());

    let edited = store.increment().unwrap();
    fx.gateway.persist(edited).await;
    assert!(fx.gateway.is_pending_sync());
    assert_eq!(fx.gateway.reconcile().await, ReconcileOutcome::Skipped);

    fx.remote.set_current(Some(ValueSnapshot::new(2, 2)));
    fx.connectivity.set_online(true);
    let outcome = fx.gateway.reconcile().await;

    match outcome {
        ReconcileOutcome::LocalPushed(PersistOutcome::Synced(snapshot)) => {
            assert_eq!(snapshot.value, 3);
            assert_eq!(snapshot.version, 3);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(fx.remote.current().unwrap().value, 3);
    assert!(!fx.gateway.is_pending_sync());
    assert_eq!(fx.gateway.reconcile().await, ReconcileOutcome::UpToDate);
}

#[tokio::test]
async fn reconcile_with_nothing_anywhere_is_up_to_date() {
    let fx = fixture(StoreConfig::new(), true);
    assert_eq!(fx.gateway.reconcile().await, ReconcileOutcome::UpToDate);
}

#[tokio::test(start_paused = true)]
async fn reconnect_watcher_reconciles_on_transition() {
    let fx = fixture(StoreConfig::new(), false);
    let store = Arc::new(ValueStore::new(Bounds::default(), ValueSnapshot::new(1, 1)).unwrap());
    fx.gateway.bind_store(store.clone());
    let watcher = fx.gateway.spawn_reconnect_watcher();
    let mut notices = fx.gateway.notices();

    fx.remote.set_current(Some(ValueSnapshot::new(30, 3)));
    fx.connectivity.set_online(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.snapshot().value, 30);
    assert!(drain(&mut notices).contains(&Notice::Reconciled { version: 3 }));

    fx.connectivity.set_online(false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut notices).contains(&Notice::WorkingOffline));
    watcher.abort();
}

#[tokio::test]
async fn file_cache_backs_the_gateway() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(tallystore::FileCache::open(dir.path()).unwrap());
    let gateway = PersistenceGateway::new(
        StoreConfig::new().key_prefix("demo"),
        Arc::new(InMemoryRemote::new(Bounds::default())),
        cache.clone(),
        Connectivity::offline(),
    );

    gateway.persist(ValueSnapshot::new(-12, 0)).await;

    assert!(dir.path().join("demo_counter.json").exists());
    let raw = cache.read("demo_counter").unwrap().unwrap();
    assert!(String::from_utf8(raw).unwrap().contains("\"value\": -12"));
    assert_eq!(gateway.load().await.source, LoadSource::Cache);
}

#[tokio::test]
async fn load_rejects_remote_counter_outside_configured_bounds() {
    let fx = fixture(StoreConfig::new().bounds(-3, 3), true);
    let wide = Arc::new(InMemoryRemote::new(Bounds::default()));
    wide.set_current(Some(ValueSnapshot::new(50, 2)));
    let gateway = PersistenceGateway::new(
        StoreConfig::new().bounds(-3, 3),
        wide,
        fx.cache.clone(),
        fx.connectivity.clone(),
    );
    let mut notices = gateway.notices();

    let loaded = gateway.load().await;

    assert_eq!(loaded.source, LoadSource::Default);
    assert_eq!(loaded.snapshot.value, 0);
    assert_eq!(fx.cache.write_count("counter"), 0);
    assert!(drain(&mut notices).contains(&Notice::DiscardedMalformed {
        source: Tier::Remote
    }));
}

#[tokio::test]
async fn queued_persist_is_skipped_once_reconcile_adopts_remote() {
    let fx = fixture(StoreConfig::new(), true);
    let store = Arc::new(ValueStore::new(Bounds::default(), ValueSnapshot::new(0, 0)).unwrap());
    fx.gateway.bind_store(store.clone());

    let queued = store.increment().unwrap();
    fx.gateway.mark_pending();
    fx.remote.set_current(Some(ValueSnapshot::new(10, 3)));
    assert!(matches!(
        fx.gateway.reconcile().await,
        ReconcileOutcome::RemoteAdopted(_)
    ));

    assert_eq!(fx.gateway.persist_if_pending(queued).await, None);
    assert_eq!(fx.remote.save_count(), 0);
    assert_eq!(fx.remote.current().unwrap().value, 10);
    assert_eq!(fx.gateway.read_cached_snapshot().unwrap().version, 3);

    let next = store.increment().unwrap();
    fx.gateway.mark_pending();
    let outcome = fx.gateway.persist_if_pending(next).await.unwrap();
    assert!(outcome.is_synced());
    assert_eq!(outcome.snapshot().version, 4);
}
