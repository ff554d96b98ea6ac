//! Cluster mutex over a shared SQLite lock store
//!
//! Each "instance" gets its own scheduler, identity and connection pool on
//! the same database file, the way separate processes on separate hosts
//! would share it.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cadence_core::application::{SchedulerConfig, SchedulerDeps, StoreRetry, TaskScheduler, TaskSpec};
use cadence_core::domain::mutex_record::record_key;
use cadence_core::domain::{ExecutionOutcome, MutexRecord, ScheduleExpr};
use cadence_core::port::alert_sink::mocks::RecordingAlertSink;
use cadence_core::port::callback::task_fn;
use cadence_core::port::time_provider::mocks::ManualTimeProvider;
use cadence_core::port::time_provider::SystemTimeProvider;
use cadence_core::port::{LockStore, TimeProvider};
use cadence_infra_sqlite::{open_database, run_migrations, SqliteLockStore};
use cadence_infra_system::detect_identity;
use futures::future::join_all;
use sqlx::SqlitePool;

const BASE_MS: i64 = 1_700_000_000_000;
const TASK_ID: &str = "reports.rollup";

fn fleet_config() -> SchedulerConfig {
    SchedulerConfig {
        dispatcher_threads: 2,
        store_retry: StoreRetry::new(5, 10),
        jitter_min_ms: 0,
        jitter_max_ms: 5,
        record_slack_ms: 5_000,
    }
}

struct Instance {
    scheduler: TaskScheduler,
    runs: Arc<AtomicUsize>,
}

async fn open_store(db: &Path, clock: Arc<dyn TimeProvider>) -> (SqlitePool, Arc<SqliteLockStore>) {
    let pool = open_database(db).await.unwrap();
    run_migrations(&pool).await.unwrap();
    (pool.clone(), Arc::new(SqliteLockStore::new(pool, clock)))
}

async fn instance(db: &Path, n: usize, clock: Arc<dyn TimeProvider>, schedule: &str) -> Instance {
    let (_, store) = open_store(db, clock.clone()).await;
    let scheduler = TaskScheduler::new(
        SchedulerDeps {
            time_provider: clock,
            lock_store: store,
            alert_sink: Arc::new(RecordingAlertSink::new()),
            identity: detect_identity(Some(&format!("node-{}", n)), 9527),
        },
        fleet_config(),
    );

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    scheduler
        .register(
            TaskSpec::new(
                TASK_ID,
                ScheduleExpr::parse(schedule).unwrap(),
                task_fn(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .cluster_exclusive(),
        )
        .unwrap();

    Instance { scheduler, runs }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_owner_per_cycle_across_fleet() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("locks.db");
    let clock = Arc::new(ManualTimeProvider::new(BASE_MS));

    let mut fleet = Vec::new();
    for n in 0..4 {
        fleet.push(instance(&db, n, clock.clone(), "0 * * * * *").await);
    }

    for cycle in 0..3 {
        let outcomes = join_all(fleet.iter().map(|inst| {
            let scheduler = inst.scheduler.clone();
            let task = scheduler.task(TASK_ID).unwrap();
            let now = clock.now_millis();
            async move {
                let next = task.advance(now).unwrap();
                scheduler.execute(&task, next).await
            }
        }))
        .await;

        let completed = outcomes
            .iter()
            .filter(|o| **o == ExecutionOutcome::Completed)
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| **o == ExecutionOutcome::SkippedNotOwner)
            .count();
        assert_eq!(completed, 1, "cycle {}: {:?}", cycle, outcomes);
        assert_eq!(skipped, 3, "cycle {}: {:?}", cycle, outcomes);

        clock.advance(60_000);
    }

    let total: usize = fleet.iter().map(|i| i.runs.load(Ordering::SeqCst)).sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_record_names_owner_for_every_instance() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("locks.db");
    let clock = Arc::new(ManualTimeProvider::new(BASE_MS));

    let a = instance(&db, 1, clock.clone(), "0 * * * * *").await;
    let b = instance(&db, 2, clock.clone(), "0 * * * * *").await;

    let task_a = a.scheduler.task(TASK_ID).unwrap();
    let next = task_a.advance(clock.now_millis()).unwrap();
    assert_eq!(a.scheduler.execute(&task_a, next).await, ExecutionOutcome::Completed);

    let owner = a.scheduler.identity().owner_id();
    let info_b = b.scheduler.describe(&b.scheduler.task(TASK_ID).unwrap()).await;
    assert_eq!(info_b.owner.as_deref(), Some(owner.as_str()));

    let (_, store) = open_store(&db, clock.clone()).await;
    let raw = store.get(&record_key(TASK_ID)).await.unwrap().unwrap();
    let record = MutexRecord::from_json(&raw).unwrap();
    assert!(!record.running);
    assert_eq!(record.next_start, next.next_start);
    assert_eq!(record.owner_id(), owner);
}

#[tokio::test]
async fn test_cycle_locks_expire_and_get_purged() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("locks.db");
    let clock = Arc::new(ManualTimeProvider::new(BASE_MS));
    let a = instance(&db, 1, clock.clone(), "0 * * * * *").await;

    let task = a.scheduler.task(TASK_ID).unwrap();
    let next = task.advance(clock.now_millis()).unwrap();
    a.scheduler.execute(&task, next).await;

    let (pool, store) = open_store(&db, clock.clone()).await;
    let lock_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM locks WHERE key LIKE 'cadence:lock:%'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(lock_rows, 1);

    // Past both the cycle lock and the record lease
    clock.advance(10 * 60_000);
    let removed = store.purge_expired().await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.live_count().await.unwrap(), 0);
}

/// Real clock, real dispatch loops: three instances, one run per second
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_loops_share_each_second() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("locks.db");
    let clock: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let seconds = Arc::new(Mutex::new(Vec::new()));

    let mut schedulers = Vec::new();
    for n in 0..3 {
        let (_, store) = open_store(&db, clock.clone()).await;
        let scheduler = TaskScheduler::new(
            SchedulerDeps {
                time_provider: clock.clone(),
                lock_store: store,
                alert_sink: Arc::new(RecordingAlertSink::new()),
                identity: detect_identity(Some(&format!("node-{}", n)), 9527),
            },
            fleet_config(),
        );

        let seconds = seconds.clone();
        let wall = clock.clone();
        scheduler
            .register(
                TaskSpec::new(
                    "heartbeat.tick",
                    ScheduleExpr::parse("* * * * * *").unwrap(),
                    task_fn(move || {
                        let seconds = seconds.clone();
                        let wall = wall.clone();
                        async move {
                            if let Ok(mut s) = seconds.lock() {
                                s.push(wall.now_millis() / 1000);
                            }
                            Ok(())
                        }
                    }),
                )
                .cluster_exclusive(),
            )
            .unwrap();
        scheduler.initialize().unwrap();
        schedulers.push(scheduler);
    }

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    for scheduler in &schedulers {
        scheduler.shutdown().await;
    }

    let seconds = seconds.lock().unwrap().clone();
    let distinct: HashSet<i64> = seconds.iter().copied().collect();
    assert!((2..=4).contains(&seconds.len()), "runs: {:?}", seconds);
    assert_eq!(distinct.len(), seconds.len(), "a second ran twice: {:?}", seconds);
}
