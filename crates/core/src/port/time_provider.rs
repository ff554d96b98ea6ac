// Time Provider Port (for testability)

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that only moves when told to (may also move backward)
    pub struct ManualTimeProvider {
        now: AtomicI64,
    }

    impl ManualTimeProvider {
        pub fn new(now_millis: i64) -> Self {
            Self {
                now: AtomicI64::new(now_millis),
            }
        }

        pub fn set(&self, now_millis: i64) {
            self.now.store(now_millis, Ordering::SeqCst);
        }

        pub fn advance(&self, delta_millis: i64) {
            self.now.fetch_add(delta_millis, Ordering::SeqCst);
        }
    }

    impl TimeProvider for ManualTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    /// Epoch clock driven by tokio's clock, so `start_paused` tests advance
    /// wall time together with timers.
    pub struct VirtualClock {
        base_millis: i64,
        origin: tokio::time::Instant,
    }

    impl VirtualClock {
        pub fn starting_at(base_millis: i64) -> Self {
            Self {
                base_millis,
                origin: tokio::time::Instant::now(),
            }
        }
    }

    impl TimeProvider for VirtualClock {
        fn now_millis(&self) -> i64 {
            self.base_millis + self.origin.elapsed().as_millis() as i64
        }
    }
}
