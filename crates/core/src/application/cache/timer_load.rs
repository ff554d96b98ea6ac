// Timer-Load Container - scheduler-refreshed value, non-blocking reads
//
// The value lives in a watch channel. The scheduler task owns the sender;
// readers only ever borrow the latest snapshot.

use super::{CacheContainer, CacheStats, StatCounters};
use crate::application::scheduler::{ScheduledTask, TaskScheduler, TaskSpec};
use crate::domain::{CachePolicy, ScheduleExpr};
use crate::error::{AppError, Result};
use crate::port::callback::producing_task_fn;
use crate::port::{ComputeError, ResultHandler, TaskError, TaskOutput};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Snapshot<V> {
    value: Option<V>,
    updated_at: i64,
}

pub struct TimerLoadContainer<V> {
    identity: String,
    policy: CachePolicy,
    rx: watch::Receiver<Snapshot<V>>,
    task: Arc<ScheduledTask>,
    stats: Arc<StatCounters>,
}

impl<V> TimerLoadContainer<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Compute the initial value and register the refresh task
    /// `"{identity}.timerLoad"` with `scheduler`.
    ///
    /// Fails when the policy is invalid, the initial computation errors, or
    /// it yields nothing while absent values are not allowed.
    pub async fn create<F, Fut>(
        scheduler: &TaskScheduler,
        identity: impl Into<String>,
        policy: CachePolicy,
        op: F,
    ) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Option<V>, ComputeError>> + Send + 'static,
    {
        let identity = identity.into();
        policy
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        let schedule = ScheduleExpr::period_schedule(policy.period_ms, &identity)?;

        let op = Arc::new(op);
        let initial = op().await?;
        if initial.is_none() && !policy.cache_absent {
            return Err(AppError::Config(format!(
                "Timer-load operation '{}' produced no initial value",
                identity
            )));
        }

        let clock = scheduler.time_provider();
        let stats = Arc::new(StatCounters::default());
        stats.load(true);
        let (tx, rx) = watch::channel(Snapshot {
            value: initial,
            updated_at: clock.now_millis(),
        });

        let callback = {
            let op = op.clone();
            let stats = stats.clone();
            producing_task_fn(move || {
                let op = op.clone();
                let stats = stats.clone();
                async move {
                    op().await.map_err(|e| {
                        stats.load(false);
                        TaskError::new(e.to_string())
                    })
                }
            })
        };

        let on_result: ResultHandler = {
            let identity = identity.clone();
            let stats = stats.clone();
            let cache_absent = policy.cache_absent;
            Arc::new(move |output: TaskOutput| match output.downcast::<Option<V>>() {
                Ok(value) if value.is_none() && !cache_absent => {
                    warn!(identity = %identity, "Refresh produced no value, keeping previous");
                }
                Ok(value) => {
                    tx.send_replace(Snapshot {
                        value: *value,
                        updated_at: clock.now_millis(),
                    });
                    stats.load(true);
                    debug!(identity = %identity, "Timer-load value refreshed");
                }
                Err(_) => {
                    warn!(identity = %identity, "Refresh produced an unexpected value type");
                }
            })
        };

        let task_id = format!("{}.timerLoad", identity);
        let task = scheduler.register(TaskSpec::new(task_id, schedule, callback).on_result(on_result))?;
        info!(
            identity = %identity,
            task_id = %task.id(),
            schedule = %task.schedule(),
            "Timer-load container created"
        );

        Ok(Self {
            identity,
            policy,
            rx,
            task,
            stats,
        })
    }

    /// Latest stored value; never blocks and never computes
    pub fn get(&self) -> Option<V> {
        self.stats.hit();
        self.rx.borrow().value.clone()
    }

    /// When the stored value was last replaced (epoch ms)
    pub fn updated_at(&self) -> i64 {
        self.rx.borrow().updated_at
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// The refresh task registered for this container
    pub fn task(&self) -> &Arc<ScheduledTask> {
        &self.task
    }
}

impl<V> CacheContainer for TimerLoadContainer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn identity(&self) -> &str {
        &self.identity
    }

    fn len(&self) -> usize {
        usize::from(self.rx.borrow().value.is_some())
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::StoreRetry;
    use crate::application::scheduler::{SchedulerConfig, SchedulerDeps};
    use crate::domain::ExecutionOutcome;
    use crate::port::alert_sink::mocks::RecordingAlertSink;
    use crate::port::lock_store::mocks::InMemoryLockStore;
    use crate::port::time_provider::mocks::{ManualTimeProvider, VirtualClock};
    use crate::port::{InstanceIdentity, TimeProvider};
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    const BASE_MS: i64 = 1_700_000_000_000;

    fn scheduler(clock: Arc<dyn TimeProvider>) -> TaskScheduler {
        TaskScheduler::new(
            SchedulerDeps {
                time_provider: clock.clone(),
                lock_store: Arc::new(InMemoryLockStore::new(clock)),
                alert_sink: Arc::new(RecordingAlertSink::new()),
                identity: InstanceIdentity::new("node-a", "10.0.0.1:9527"),
            },
            SchedulerConfig {
                store_retry: StoreRetry::new(1, 1),
                ..SchedulerConfig::default()
            },
        )
    }

    type CounterFuture = BoxFuture<'static, std::result::Result<Option<u32>, ComputeError>>;

    fn counter_op(calls: Arc<AtomicU32>) -> impl Fn() -> CounterFuture + Send + Sync + 'static {
        move || -> CounterFuture {
            let calls = calls.clone();
            Box::pin(async move { Ok(Some(calls.fetch_add(1, Ordering::SeqCst) + 1)) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_refreshed_by_scheduler() {
        let clock = Arc::new(VirtualClock::starting_at(BASE_MS));
        let scheduler = scheduler(clock.clone());
        let calls = Arc::new(AtomicU32::new(0));

        let cache = TimerLoadContainer::create(
            &scheduler,
            "rates.current",
            CachePolicy::new(2_000),
            counter_op(calls.clone()),
        )
        .await
        .unwrap();
        assert_eq!(cache.get(), Some(1));
        assert_eq!(cache.task().id(), "rates.current.timerLoad");
        let created_at = cache.updated_at();

        scheduler.initialize().unwrap();
        tokio::time::sleep(Duration::from_millis(5_000)).await;

        let latest = cache.get().unwrap();
        assert!(latest >= 2, "value never refreshed: {}", latest);
        assert!(cache.updated_at() > created_at);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_absent_initial_value_is_config_error() {
        let clock = Arc::new(ManualTimeProvider::new(BASE_MS));
        let scheduler = scheduler(clock);

        let result = TimerLoadContainer::<u32>::create(
            &scheduler,
            "rates.current",
            CachePolicy::new(60_000),
            || async { Ok(None) },
        )
        .await;
        assert!(matches!(result, Err(AppError::Config(_))));
        assert!(scheduler.task("rates.current.timerLoad").is_none());
    }

    #[tokio::test]
    async fn test_failing_initial_computation_is_compute_error() {
        let clock = Arc::new(ManualTimeProvider::new(BASE_MS));
        let scheduler = scheduler(clock);

        let result = TimerLoadContainer::<u32>::create(
            &scheduler,
            "rates.current",
            CachePolicy::new(60_000),
            || async {
                Err(ComputeError::Failed {
                    identity: "rates.current".to_string(),
                    message: "upstream down".to_string(),
                })
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Compute(_))));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let clock = Arc::new(ManualTimeProvider::new(BASE_MS));
        let scheduler = scheduler(clock.clone());
        let calls = Arc::new(AtomicU32::new(0));
        let op_calls = calls.clone();

        let cache = TimerLoadContainer::create(
            &scheduler,
            "rates.current",
            CachePolicy::new(60_000),
            move || {
                let attempt = op_calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Ok(Some(10u32))
                    } else {
                        Err(ComputeError::Failed {
                            identity: "rates.current".to_string(),
                            message: "upstream down".to_string(),
                        })
                    }
                }
            },
        )
        .await
        .unwrap();

        let task = cache.task().clone();
        let cycle = task.advance(clock.now_millis()).unwrap();
        assert_eq!(scheduler.execute(&task, cycle).await, ExecutionOutcome::Failed);

        assert_eq!(cache.get(), Some(10));
        assert_eq!(cache.stats().load_failures, 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_refresh() {
        let clock = Arc::new(ManualTimeProvider::new(BASE_MS));
        let scheduler = scheduler(clock.clone());
        let gate = Arc::new(Semaphore::new(1));
        let op_gate = gate.clone();
        let calls = Arc::new(AtomicU32::new(0));
        let op_calls = calls.clone();

        let cache = Arc::new(
            TimerLoadContainer::create(&scheduler, "rates.current", CachePolicy::new(60_000), move || {
                let gate = op_gate.clone();
                let calls = op_calls.clone();
                async move {
                    let _permit = gate.acquire().await.map_err(|e| ComputeError::Failed {
                        identity: "rates.current".to_string(),
                        message: e.to_string(),
                    })?;
                    Ok(Some(calls.fetch_add(1, Ordering::SeqCst) + 1))
                }
            })
            .await
            .unwrap(),
        );

        // Hold the gate so the refresh stalls mid-computation
        let held = gate.clone().acquire_owned().await.unwrap();
        let task = cache.task().clone();
        let cycle = task.advance(clock.now_millis()).unwrap();
        let refresh = {
            let scheduler = scheduler.clone();
            let task = task.clone();
            tokio::spawn(async move { scheduler.execute(&task, cycle).await })
        };
        while !task.is_running() {
            tokio::task::yield_now().await;
        }

        for _ in 0..100 {
            assert_eq!(cache.get(), Some(1));
        }

        drop(held);
        assert_eq!(refresh.await.unwrap(), ExecutionOutcome::Completed);
        assert_eq!(cache.get(), Some(2));
        assert_eq!(cache.len(), 1);
    }
}
