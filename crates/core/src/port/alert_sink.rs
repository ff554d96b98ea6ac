// Alerting Port
// Fire-and-forget; a failing sink must never take the scheduler down.

use tracing::warn;

/// Conditions the scheduler reports to operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    TaskFailed {
        task_id: String,
        schedule: String,
        started_at: i64,
        elapsed_ms: i64,
        detail: String,
    },
    Overrun {
        task_id: String,
        schedule: String,
        running_for_ms: i64,
    },
    ScheduleConflict {
        task_id: String,
        local: String,
        shared: String,
        shared_owner: String,
    },
    LockStoreUnavailable {
        task_id: String,
        detail: String,
    },
}

impl Alert {
    pub fn subject(&self) -> String {
        match self {
            Alert::TaskFailed { task_id, .. } => format!("[cadence] task {} failed", task_id),
            Alert::Overrun { task_id, .. } => format!("[cadence] task {} overran its schedule", task_id),
            Alert::ScheduleConflict { task_id, .. } => {
                format!("[cadence] schedule conflict on {}", task_id)
            }
            Alert::LockStoreUnavailable { task_id, .. } => {
                format!("[cadence] lock store unavailable for {}", task_id)
            }
        }
    }

    pub fn body(&self) -> String {
        match self {
            Alert::TaskFailed {
                task_id,
                schedule,
                started_at,
                elapsed_ms,
                detail,
            } => format!(
                "task: {}\nschedule: {}\nstarted_at: {}\nelapsed_ms: {}\nerror: {}",
                task_id, schedule, started_at, elapsed_ms, detail
            ),
            Alert::Overrun {
                task_id,
                schedule,
                running_for_ms,
            } => format!(
                "task: {}\nschedule: {}\nprevious run still active after {}ms; this cycle is skipped",
                task_id, schedule, running_for_ms
            ),
            Alert::ScheduleConflict {
                task_id,
                local,
                shared,
                shared_owner,
            } => format!(
                "task: {}\nlocal schedule: {}\nshared schedule: {} (written by {})\nlocal value will overwrite the shared record",
                task_id, local, shared, shared_owner
            ),
            Alert::LockStoreUnavailable { task_id, detail } => format!(
                "task: {}\ncycle skipped, lock could not be confirmed: {}",
                task_id, detail
            ),
        }
    }
}

/// Alert sink port
pub trait AlertSink: Send + Sync {
    /// Deliver an alert; implementations must not block or panic
    fn notify(&self, subject: &str, body: &str);

    fn raise(&self, alert: &Alert) {
        self.notify(&alert.subject(), &alert.body());
    }
}

/// Sink that only writes to the log
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, subject: &str, body: &str) {
        warn!(subject = %subject, body = %body, "Alert raised");
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every alert for later assertions
    #[derive(Default)]
    pub struct RecordingAlertSink {
        alerts: Mutex<Vec<(String, String)>>,
    }

    impl RecordingAlertSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn alerts(&self) -> Vec<(String, String)> {
            self.alerts.lock().unwrap().clone()
        }

        pub fn count_containing(&self, needle: &str) -> usize {
            self.alerts
                .lock()
                .unwrap()
                .iter()
                .filter(|(subject, _)| subject.contains(needle))
                .count()
        }
    }

    impl AlertSink for RecordingAlertSink {
        fn notify(&self, subject: &str, body: &str) {
            self.alerts
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
        }
    }

    /// Sink that panics on every alert, counting the attempts
    #[derive(Default)]
    pub struct PanickingAlertSink {
        attempts: std::sync::atomic::AtomicUsize,
    }

    impl PanickingAlertSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl AlertSink for PanickingAlertSink {
        fn notify(&self, subject: &str, _body: &str) {
            self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            panic!("alert transport exploded on '{}'", subject);
        }
    }
}
