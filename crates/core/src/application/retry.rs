// Bounded retry for lock-store calls
//
// Only connectivity failures are retried. A logical answer from the store
// (key already present, value absent) is returned immediately, and so is any
// non-transient error.

use crate::port::StoreError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default attempt cap for store calls
pub const DEFAULT_STORE_ATTEMPTS: u32 = 3;

/// Default base backoff (50ms)
pub const DEFAULT_STORE_BASE_DELAY_MS: u64 = 50;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given backoff delay in ms
    Retry(u64),
    /// Stop and surface the error
    GiveUp,
}

/// Retry policy for the distributed lock client
#[derive(Debug, Clone)]
pub struct StoreRetry {
    max_attempts: u32,
    base_delay_ms: u64,
}

impl StoreRetry {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts including the first one (min 1)
    /// * `base_delay_ms` - Delay before the second attempt; doubles afterwards
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after `attempt` (1-based) failed with `err`
    ///
    /// Backoff: delay = base_delay * 2^(attempt-1) * (1.0 ± 0.1)
    pub fn decide(&self, attempt: u32, err: &StoreError) -> RetryDecision {
        if !err.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let base = self.base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
        // ±10% jitter so instances that failed together do not retry together
        let jitter_factor = rand::thread_rng().gen_range(0.9..=1.1);
        RetryDecision::Retry((base as f64 * jitter_factor) as u64)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => match self.decide(attempt, &err) {
                    RetryDecision::Retry(delay_ms) => {
                        debug!(
                            operation = %operation,
                            attempt = attempt,
                            delay_ms = delay_ms,
                            error = %err,
                            "Retrying lock store call"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        warn!(
                            operation = %operation,
                            attempts = attempt,
                            error = %err,
                            "Lock store call failed"
                        );
                        return Err(err);
                    }
                },
            }
        }
    }
}

impl Default for StoreRetry {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_ATTEMPTS, DEFAULT_STORE_BASE_DELAY_MS)
    }
}
