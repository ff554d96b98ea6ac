//! Built-in lock store maintenance
//!
//! Expired cycle locks and mutex records behave as absent but stay in the
//! table until purged. One instance per cycle purges them for the fleet.

use crate::settings::MAINTENANCE_SCHEDULE_KEY;
use cadence_core::port::callback::task_fn;
use cadence_core::port::{ManagedComponent, ScheduleSource, ScheduledMethod, TaskError};
use cadence_infra_sqlite::SqliteLockStore;
use std::sync::Arc;
use tracing::info;

pub struct LockStoreMaintenance {
    store: Arc<SqliteLockStore>,
}

impl LockStoreMaintenance {
    pub fn new(store: Arc<SqliteLockStore>) -> Self {
        Self { store }
    }
}

impl ManagedComponent for LockStoreMaintenance {
    fn name(&self) -> &str {
        "lockStore"
    }

    fn scheduled_methods(&self) -> Vec<ScheduledMethod> {
        let store = self.store.clone();
        let purge = task_fn(move || {
            let store = store.clone();
            async move {
                let removed = store
                    .purge_expired()
                    .await
                    .map_err(|e| TaskError::new(format!("purge failed: {}", e)))?;
                info!(removed = removed, "Expired lock store rows purged");
                Ok(())
            }
        });

        vec![ScheduledMethod::new(
            "purgeExpired",
            ScheduleSource::ConfigKey(MAINTENANCE_SCHEDULE_KEY.to_string()),
            purge,
        )
        .cluster_exclusive()
        .report_overrun(false)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::application::{register_components, SchedulerConfig, SchedulerDeps, TaskScheduler};
    use cadence_core::domain::{Exclusivity, ExecutionOutcome};
    use cadence_core::port::alert_sink::mocks::RecordingAlertSink;
    use cadence_core::port::config_source::mocks::StaticConfigSource;
    use cadence_core::port::time_provider::mocks::ManualTimeProvider;
    use cadence_core::port::{InstanceIdentity, LockStore, TimeProvider};
    use cadence_infra_sqlite::{open_database, run_migrations};

    #[tokio::test]
    async fn test_purge_task_registers_and_removes_expired_rows() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_database(&dir.path().join("locks.db")).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let clock = Arc::new(ManualTimeProvider::new(1_700_000_000_000));
        let time_provider: Arc<dyn TimeProvider> = clock.clone();
        let store = Arc::new(SqliteLockStore::new(pool, time_provider.clone()));
        tokio_test::assert_ok!(store.put("stale", "x", 1_000).await);
        tokio_test::assert_ok!(store.put("fresh", "y", 3_600_000).await);
        clock.advance(5_000);

        let scheduler = TaskScheduler::new(
            SchedulerDeps {
                time_provider,
                lock_store: store.clone(),
                alert_sink: Arc::new(RecordingAlertSink::new()),
                identity: InstanceIdentity::new("node-a", "127.0.0.1:9527"),
            },
            SchedulerConfig::default(),
        );
        let config = StaticConfigSource::new().with(MAINTENANCE_SCHEDULE_KEY, "0 */10 * * * *");
        let tasks = register_components(
            &scheduler,
            &config,
            vec![Arc::new(LockStoreMaintenance::new(store.clone()))],
        )
        .unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id(), "lockStore.purgeExpired");
        assert_eq!(tasks[0].exclusivity(), Exclusivity::ClusterExclusive);

        let cycle = tasks[0].advance(clock.now_millis()).unwrap();
        let outcome = scheduler.execute(&tasks[0], cycle).await;
        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert_eq!(store.get("stale").await.unwrap(), None);
        assert_eq!(store.get("fresh").await.unwrap().as_deref(), Some("y"));
        // Expired rows are gone, not just hidden
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }
}
