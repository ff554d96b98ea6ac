//! Cache containers driven by a live scheduler on the real clock

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::application::{
    cache_op, CacheContainer, HashedKeyStrategy, LazyContainer, SchedulerConfig, SchedulerDeps, TaskScheduler,
    TimerLoadContainer,
};
use cadence_core::domain::CachePolicy;
use cadence_core::port::alert_sink::mocks::RecordingAlertSink;
use cadence_core::port::time_provider::SystemTimeProvider;
use cadence_core::port::{ComputeError, InstanceIdentity, TimeProvider};
use cadence_infra_sqlite::{open_database, run_migrations, SqliteLockStore};
use futures::future::join_all;
use serde_json::json;

async fn scheduler(dir: &tempfile::TempDir) -> TaskScheduler {
    let pool = open_database(&dir.path().join("locks.db")).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let clock: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);

    TaskScheduler::new(
        SchedulerDeps {
            time_provider: clock.clone(),
            lock_store: Arc::new(SqliteLockStore::new(pool, clock)),
            alert_sink: Arc::new(RecordingAlertSink::new()),
            identity: InstanceIdentity::new("node-a", "127.0.0.1:9527"),
        },
        SchedulerConfig::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timer_load_refreshes_every_period() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler(&dir).await;

    let version = Arc::new(AtomicU64::new(0));
    let source = version.clone();
    let container = TimerLoadContainer::create(
        &scheduler,
        "pricing.table",
        CachePolicy::new(1_000),
        move || {
            let source = source.clone();
            async move { Ok::<_, ComputeError>(Some(source.fetch_add(1, Ordering::SeqCst))) }
        },
    )
    .await
    .unwrap();

    assert_eq!(container.get(), Some(0));
    scheduler.initialize().unwrap();

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    scheduler.shutdown().await;

    let latest = container.get().unwrap();
    assert!(latest >= 2, "refreshed only {} times", latest);
    assert!(container.stats().loads >= 3);
    assert_eq!(scheduler.tasks().len(), 1);
    assert_eq!(container.task().id(), "pricing.table.timerLoad");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lazy_container_single_flight_under_contention() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler(&dir).await;

    let computations = Arc::new(AtomicUsize::new(0));
    let counter = computations.clone();
    let container = Arc::new(
        LazyContainer::new(
            "catalog.lookup",
            CachePolicy::new(60_000),
            Arc::new(HashedKeyStrategy),
            scheduler.time_provider(),
            cache_op(move |args: serde_json::Value| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, ComputeError>(args["sku"].as_str().map(|s| s.to_uppercase()))
                }
            }),
        )
        .unwrap(),
    );

    let results = join_all((0..32).map(|i| {
        let container = container.clone();
        let sku = if i % 2 == 0 { "ab-1" } else { "cd-2" };
        tokio::spawn(async move { container.get(json!({ "sku": sku })).await })
    }))
    .await;

    for result in results {
        let value = result.unwrap().unwrap();
        assert!(matches!(value.as_deref(), Some("AB-1") | Some("CD-2")));
    }
    assert_eq!(computations.load(Ordering::SeqCst), 2);
    assert_eq!(container.len(), 2);

    let stats = container.stats();
    assert_eq!(stats.loads, 2);
    assert_eq!(stats.hits + stats.misses, 32);
}
