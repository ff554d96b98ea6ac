//! Task Scheduler - fires registered tasks on their schedules
//!
//! Two lanes:
//! - dispatcher: one timer loop per task; under a small permit pool
//!   (≈ available cores) it only does the rescheduling math and re-arms
//! - worker: each firing's body runs in its own tokio task, so a slow body
//!   never delays the next cycle's scheduling, only (via the overlap check)
//!   the next cycle's execution
//!
//! Per firing:
//! 1. `next_start = schedule.next_after(max(now, next_start))`
//! 2. re-arm for `next_start` before the body runs
//! 3. hand off to the worker; skip if the previous run is still active
//! 4. run directly, or behind the cluster mutex for cluster-exclusive tasks
//! 5. deliver the result or raise an alert; failures never escape
//! 6. clear `running`, record cost, refresh the shared mutex record

mod cluster;
pub mod constants;
pub mod panic_guard;
pub mod task;

pub use task::{NextTimeInfo, ScheduledTask, TaskSpec};

use crate::application::retry::StoreRetry;
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::domain::task::validate_task_id;
use crate::domain::{Exclusivity, ExecutionOutcome, TaskId, TaskInfo};
use crate::error::{AppError, Result};
use crate::port::{Alert, AlertSink, InstanceIdentity, LockStore, TimeProvider};
use cluster::{ClusterMutex, Ownership};
use constants::*;
use panic_guard::{execute_guarded, panic_message, raise_guarded, PanicGuardResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// External collaborators of the scheduler
#[derive(Clone)]
pub struct SchedulerDeps {
    pub time_provider: Arc<dyn TimeProvider>,
    pub lock_store: Arc<dyn LockStore>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub identity: InstanceIdentity,
}

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrent rescheduling computations (dispatcher lane size)
    pub dispatcher_threads: usize,
    /// Retry policy for lock store calls
    pub store_retry: StoreRetry,
    /// Back-off window for the previous cycle owner
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    /// Extra mutex record lifetime past its lease
    pub record_slack_ms: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dispatcher_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            store_retry: StoreRetry::default(),
            jitter_min_ms: DEFAULT_JITTER_MIN_MS,
            jitter_max_ms: DEFAULT_JITTER_MAX_MS,
            record_slack_ms: DEFAULT_RECORD_SLACK_MS,
        }
    }
}

struct SchedulerInner {
    deps: SchedulerDeps,
    config: SchedulerConfig,
    /// Append-only; duplicate ids are rejected at registration
    registry: RwLock<BTreeMap<TaskId, Arc<ScheduledTask>>>,
    dispatcher: Semaphore,
    shutdown_tx: ShutdownSender,
    loops: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

/// Recurring task scheduler
///
/// Cheap to clone; all clones drive the same registry. Each instance is
/// isolated, so tests can run several side by side to simulate a fleet.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl TaskScheduler {
    pub fn new(deps: SchedulerDeps, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _token) = shutdown_channel();
        let permits = config.dispatcher_threads.max(1);
        Self {
            inner: Arc::new(SchedulerInner {
                deps,
                config,
                registry: RwLock::new(BTreeMap::new()),
                dispatcher: Semaphore::new(permits),
                shutdown_tx,
                loops: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.inner.deps.identity
    }

    pub fn time_provider(&self) -> Arc<dyn TimeProvider> {
        self.inner.deps.time_provider.clone()
    }

    /// Register a task
    ///
    /// Duplicate ids are a configuration error. Tasks registered after
    /// `initialize()` are armed immediately.
    pub fn register(&self, spec: TaskSpec) -> Result<Arc<ScheduledTask>> {
        validate_task_id(&spec.id)?;

        let (task, armed_now) = {
            let mut registry = self
                .inner
                .registry
                .write()
                .unwrap_or_else(|e| e.into_inner());
            if registry.contains_key(&spec.id) {
                return Err(AppError::Config(format!(
                    "Duplicate scheduled task id '{}'",
                    spec.id
                )));
            }
            let task = Arc::new(ScheduledTask::new(spec));
            registry.insert(task.id().to_string(), task.clone());
            // Read under the registry lock: either initialize() sees this
            // task in its snapshot, or we see `started` and arm it here
            (task, self.inner.started.load(Ordering::SeqCst))
        };

        info!(
            task_id = %task.id(),
            schedule = %task.schedule(),
            exclusivity = %task.exclusivity(),
            "Registered scheduled task"
        );

        if armed_now {
            self.arm(task.clone());
        }
        Ok(task)
    }

    /// Arm every registered task
    pub fn initialize(&self) -> Result<()> {
        let tasks: Vec<Arc<ScheduledTask>> = {
            let registry = self
                .inner
                .registry
                .write()
                .unwrap_or_else(|e| e.into_inner());
            if self.inner.started.swap(true, Ordering::SeqCst) {
                return Err(AppError::Internal(
                    "Scheduler already initialized".to_string(),
                ));
            }
            registry.values().cloned().collect()
        };

        info!(
            task_count = tasks.len(),
            instance = %self.inner.deps.identity,
            "Scheduler starting"
        );
        for task in tasks {
            self.arm(task);
        }
        Ok(())
    }

    /// Stop all dispatch loops; bodies already running finish on their own
    pub async fn shutdown(&self) {
        info!("Scheduler shutting down");
        self.inner.shutdown_tx.shutdown();

        let loops: Vec<JoinHandle<()>> = {
            let mut guard = self.inner.loops.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        let grace = Duration::from_millis(SHUTDOWN_GRACE_MS);
        for handle in loops {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("Dispatch loop did not stop within grace period");
            }
        }
        info!("Scheduler stopped");
    }

    pub fn task(&self, id: &str) -> Option<Arc<ScheduledTask>> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// All tasks, ordered by id
    pub fn tasks(&self) -> Vec<Arc<ScheduledTask>> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Introspection listing; cluster-exclusive tasks include the current
    /// owner from the shared store
    pub async fn list_tasks(&self) -> Vec<TaskInfo> {
        let mut infos = Vec::new();
        for task in self.tasks() {
            infos.push(self.describe(&task).await);
        }
        infos
    }

    pub async fn describe(&self, task: &ScheduledTask) -> TaskInfo {
        let owner = match task.exclusivity() {
            Exclusivity::None => None,
            Exclusivity::ClusterExclusive => self
                .cluster()
                .read_record(task.id())
                .await
                .map(|record| record.owner_id()),
        };
        task.info(owner)
    }

    /// Dispatcher side of one firing: advance the task and hand the body to
    /// the worker lane. Returns the cycle that was started, or `None` when
    /// the schedule is exhausted.
    pub async fn fire(&self, task: &Arc<ScheduledTask>) -> Option<NextTimeInfo> {
        let cycle = {
            // Permit only bounds the O(1) rescheduling work
            let _permit = self.inner.dispatcher.acquire().await.ok()?;
            task.advance(self.inner.deps.time_provider.now_millis())?
        };

        debug!(
            task_id = %task.id(),
            next_start = cycle.next_start,
            "Task fired, next cycle armed"
        );

        let scheduler = self.clone();
        let task = task.clone();
        tokio::spawn(async move {
            scheduler.execute(&task, cycle).await;
        });
        Some(cycle)
    }

    /// Worker side of one firing
    pub async fn execute(&self, task: &ScheduledTask, cycle: NextTimeInfo) -> ExecutionOutcome {
        let clock = &self.inner.deps.time_provider;
        let now = clock.now_millis();

        let guard = match task.try_begin(now) {
            Ok(guard) => guard,
            Err(running_for_ms) => {
                warn!(
                    task_id = %task.id(),
                    running_for_ms = running_for_ms,
                    "Previous run still active, skipping this cycle"
                );
                if task.reports_overrun() {
                    raise_guarded(
                        self.inner.deps.alert_sink.as_ref(),
                        &Alert::Overrun {
                            task_id: task.id().to_string(),
                            schedule: task.schedule().to_string(),
                            running_for_ms,
                        },
                    );
                }
                return ExecutionOutcome::SkippedOverrun;
            }
        };
        let started_at = guard.started_at();

        let (outcome, held_lock) = match task.exclusivity() {
            Exclusivity::None => (self.invoke(task, started_at).await, false),
            Exclusivity::ClusterExclusive => {
                let cluster = self.cluster();
                match cluster.claim_cycle(task, &cycle).await {
                    Ownership::Owner => {
                        cluster
                            .write_record(task, &cycle, true, started_at, task.last_cost_ms())
                            .await;
                        (self.invoke(task, started_at).await, true)
                    }
                    Ownership::Other(owner) => {
                        debug!(
                            task_id = %task.id(),
                            owner = ?owner,
                            "Cycle owned by another instance, skipping"
                        );
                        (ExecutionOutcome::SkippedNotOwner, false)
                    }
                    Ownership::Unknown(err) => {
                        warn!(
                            task_id = %task.id(),
                            error = %err,
                            "Lock store unavailable, skipping cycle"
                        );
                        raise_guarded(
                            self.inner.deps.alert_sink.as_ref(),
                            &Alert::LockStoreUnavailable {
                                task_id: task.id().to_string(),
                                detail: err.to_string(),
                            },
                        );
                        (ExecutionOutcome::SkippedStoreUnavailable, false)
                    }
                }
            }
        };

        let cost = guard.finish(clock.now_millis());
        if held_lock {
            self.cluster()
                .write_record(task, &cycle, false, started_at, Some(cost))
                .await;
        }

        debug!(
            task_id = %task.id(),
            outcome = ?outcome,
            cost_ms = cost,
            "Task cycle finished"
        );
        outcome
    }

    /// Run the body in its own tokio task so panics stay contained
    async fn invoke(&self, task: &ScheduledTask, started_at: i64) -> ExecutionOutcome {
        let callback = task.callback();
        let handle = tokio::spawn(async move { callback().await });

        let failure = match handle.await {
            Ok(Ok(output)) => {
                if let Some(handler) = task.result_handler() {
                    if let PanicGuardResult::Panicked(msg) =
                        execute_guarded(task.id(), || handler(output))
                    {
                        error!(task_id = %task.id(), panic_msg = %msg, "Result handler panicked");
                    }
                }
                return ExecutionOutcome::Completed;
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_err) if join_err.is_panic() => {
                format!("panicked: {}", panic_message(join_err.into_panic().as_ref()))
            }
            Err(join_err) => format!("cancelled: {}", join_err),
        };

        let elapsed_ms = self.inner.deps.time_provider.now_millis() - started_at;
        error!(
            task_id = %task.id(),
            elapsed_ms = elapsed_ms,
            error = %failure,
            "Scheduled task failed"
        );
        raise_guarded(
            self.inner.deps.alert_sink.as_ref(),
            &Alert::TaskFailed {
                task_id: task.id().to_string(),
                schedule: task.schedule().to_string(),
                started_at,
                elapsed_ms,
                detail: failure,
            },
        );
        ExecutionOutcome::Failed
    }

    fn cluster(&self) -> ClusterMutex<'_> {
        ClusterMutex::new(&self.inner.deps, &self.inner.config)
    }

    fn arm(&self, task: Arc<ScheduledTask>) {
        let scheduler = self.clone();
        let shutdown = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            scheduler.dispatch_loop(task, shutdown).await;
        });
        self.inner
            .loops
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Self-rescheduling timer chain of one task
    async fn dispatch_loop(&self, task: Arc<ScheduledTask>, mut shutdown: ShutdownToken) {
        let clock = self.inner.deps.time_provider.clone();
        let Some(first) = task.advance(clock.now_millis()) else {
            warn!(task_id = %task.id(), "Schedule has no future fire times, not arming");
            return;
        };
        info!(task_id = %task.id(), next_start = first.next_start, "Task armed");

        let mut due = first.next_start;
        loop {
            // Sleep in slices so wall-clock corrections are picked up
            loop {
                let remaining = due - clock.now_millis();
                if remaining <= 0 {
                    break;
                }
                let slice = Duration::from_millis(remaining.min(MAX_SLEEP_SLICE_MS) as u64);
                tokio::select! {
                    _ = tokio::time::sleep(slice) => {}
                    _ = shutdown.wait() => {
                        debug!(task_id = %task.id(), "Dispatch loop stopped");
                        return;
                    }
                }
            }
            if shutdown.is_shutdown() {
                return;
            }

            match self.fire(&task).await {
                Some(cycle) => due = cycle.next_start,
                None => {
                    warn!(task_id = %task.id(), "Schedule exhausted, task disarmed");
                    return;
                }
            }
        }
    }
}
