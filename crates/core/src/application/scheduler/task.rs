// Scheduled Task - unit of recurring work and its run-state

use crate::domain::{Exclusivity, ScheduleExpr, TaskId, TaskInfo};
use crate::port::{ResultHandler, TaskCallback};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Registration request for a recurring task
pub struct TaskSpec {
    pub id: TaskId,
    pub schedule: ScheduleExpr,
    pub exclusivity: Exclusivity,
    pub report_overrun: bool,
    pub callback: TaskCallback,
    /// Receives each successful result (used by timer-load containers)
    pub on_result: Option<ResultHandler>,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, schedule: ScheduleExpr, callback: TaskCallback) -> Self {
        Self {
            id: id.into(),
            schedule,
            exclusivity: Exclusivity::None,
            report_overrun: true,
            callback,
            on_result: None,
        }
    }

    pub fn exclusivity(mut self, exclusivity: Exclusivity) -> Self {
        self.exclusivity = exclusivity;
        self
    }

    pub fn cluster_exclusive(self) -> Self {
        self.exclusivity(Exclusivity::ClusterExclusive)
    }

    pub fn report_overrun(mut self, report: bool) -> Self {
        self.report_overrun = report;
        self
    }

    pub fn on_result(mut self, handler: ResultHandler) -> Self {
        self.on_result = Some(handler);
        self
    }
}

/// Timing of one firing, computed by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextTimeInfo {
    /// Wall-clock time the firing was processed
    pub now: i64,
    /// Next fire instant; also the cycle key for cluster locks
    pub next_start: i64,
    /// Fire after `next_start`; bounds the mutex record lease
    pub next_next: Option<i64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct RunState {
    last_start: Option<i64>,
    last_cost_ms: Option<i64>,
    next_start: Option<i64>,
}

/// A registered task
///
/// `running` is only flipped by the worker executing the body; `next_start`
/// is only advanced by the dispatcher.
pub struct ScheduledTask {
    spec: TaskSpec,
    running: AtomicBool,
    state: Mutex<RunState>,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.spec.id)
            .finish_non_exhaustive()
    }
}

impl ScheduledTask {
    pub(crate) fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            running: AtomicBool::new(false),
            state: Mutex::new(RunState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn schedule(&self) -> &ScheduleExpr {
        &self.spec.schedule
    }

    pub fn exclusivity(&self) -> Exclusivity {
        self.spec.exclusivity
    }

    pub fn reports_overrun(&self) -> bool {
        self.spec.report_overrun
    }

    pub(crate) fn callback(&self) -> TaskCallback {
        self.spec.callback.clone()
    }

    pub(crate) fn result_handler(&self) -> Option<ResultHandler> {
        self.spec.on_result.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn next_start(&self) -> Option<i64> {
        self.state().next_start
    }

    pub fn last_start(&self) -> Option<i64> {
        self.state().last_start
    }

    pub fn last_cost_ms(&self) -> Option<i64> {
        self.state().last_cost_ms
    }

    /// Advance to the next cycle (dispatcher side)
    ///
    /// The basis is `max(now, next_start)`, so a wall clock moved backward
    /// can never make an already-fired instant fire again. Returns `None`
    /// once the schedule has no further fire times.
    pub fn advance(&self, now: i64) -> Option<NextTimeInfo> {
        let mut state = self.state();
        let basis = state.next_start.map_or(now, |prev| prev.max(now));
        let next_start = self.spec.schedule.next_after(basis)?;
        let next_next = self.spec.schedule.next_after(next_start);
        state.next_start = Some(next_start);

        Some(NextTimeInfo {
            now,
            next_start,
            next_next,
        })
    }

    /// Claim the running flag (worker side)
    ///
    /// Fails with the time the previous run has been active when the
    /// previous cycle has not finished yet.
    pub(crate) fn try_begin(&self, now: i64) -> Result<RunGuard<'_>, i64> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let since = self.state().last_start.unwrap_or(now);
            return Err(now - since);
        }

        self.state().last_start = Some(now);
        Ok(RunGuard {
            task: self,
            started_at: now,
            finished: false,
        })
    }

    pub fn info(&self, owner: Option<String>) -> TaskInfo {
        let state = *self.state();
        TaskInfo {
            id: self.spec.id.clone(),
            schedule: self.spec.schedule.to_string(),
            exclusivity: self.spec.exclusivity,
            last_start: state.last_start,
            last_cost_ms: state.last_cost_ms,
            next_start: state.next_start,
            running: self.is_running(),
            owner,
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        // Plain data behind the lock; a poisoned guard is still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Holds the running flag for one execution; releases it on drop
pub(crate) struct RunGuard<'a> {
    task: &'a ScheduledTask,
    started_at: i64,
    finished: bool,
}

impl RunGuard<'_> {
    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    /// Record the run's cost and clear the running flag
    pub fn finish(mut self, now: i64) -> i64 {
        let cost = (now - self.started_at).max(0);
        self.task.state().last_cost_ms = Some(cost);
        self.task.running.store(false, Ordering::SeqCst);
        self.finished = true;
        cost
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.task.running.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::callback::task_fn;

    const BASE_MS: i64 = 1_700_000_000_000;

    fn every_second() -> ScheduledTask {
        ScheduledTask::new(TaskSpec::new(
            "clock.tick",
            ScheduleExpr::parse("* * * * * *").unwrap(),
            task_fn(|| async { Ok(()) }),
        ))
    }

    #[test]
    fn test_next_start_never_decreases_when_clock_regresses() {
        let task = every_second();
        let clock_readings = [
            BASE_MS,
            BASE_MS + 1_000,
            BASE_MS - 30_000, // NTP correction backwards
            BASE_MS + 2_000,
            BASE_MS - 5_000,
            BASE_MS + 10_500,
            BASE_MS + 10_400,
        ];

        let mut previous = i64::MIN;
        for now in clock_readings {
            let info = task.advance(now).unwrap();
            assert!(
                info.next_start > previous,
                "next_start went from {} to {} at now={}",
                previous,
                info.next_start,
                now
            );
            previous = info.next_start;
        }
    }

    #[test]
    fn test_advance_precomputes_next_next() {
        let task = every_second();
        let info = task.advance(BASE_MS).unwrap();
        assert_eq!(info.next_start, BASE_MS + 1_000);
        assert_eq!(info.next_next, Some(BASE_MS + 2_000));
        assert_eq!(task.next_start(), Some(BASE_MS + 1_000));
    }

    #[test]
    fn test_try_begin_rejects_overlap() {
        let task = every_second();
        let guard = task.try_begin(BASE_MS).unwrap();
        assert!(task.is_running());

        let running_for = task.try_begin(BASE_MS + 1_500).err().unwrap();
        assert_eq!(running_for, 1_500);

        assert_eq!(guard.finish(BASE_MS + 2_000), 2_000);
        assert!(!task.is_running());
        assert_eq!(task.last_cost_ms(), Some(2_000));
    }

    #[test]
    fn test_dropped_guard_releases_running_flag() {
        let task = every_second();
        {
            let _guard = task.try_begin(BASE_MS).unwrap();
        }
        assert!(!task.is_running());
        assert!(task.try_begin(BASE_MS).is_ok());
    }
}
