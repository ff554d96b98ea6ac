// Lock Store Port
// Narrow contract over an external shared key-value store with atomic
// set-if-absent. Every instance of the fleet talks to the same store.

use async_trait::async_trait;
use thiserror::Error;

/// Lock store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connectivity problem; worth retrying
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// Store answered but refused the operation
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Shared store used for cluster-exclusive cycle locks and mutex records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Store `value` under `key` only if no live value exists
    ///
    /// Returns `Ok(false)` (not an error) when the key is already present.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: i64) -> Result<bool, StoreError>;

    /// Read the live value under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally store `value` under `key`
    async fn put(&self, key: &str, value: &str, ttl_ms: i64) -> Result<(), StoreError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::TimeProvider;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-process store with TTL, shared between simulated instances
    pub struct InMemoryLockStore {
        entries: Mutex<HashMap<String, (String, i64)>>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryLockStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
                time_provider,
            }
        }

        /// Number of live keys starting with `prefix`
        pub fn count_prefix(&self, prefix: &str) -> usize {
            let now = self.time_provider.now_millis();
            self.entries
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, (_, exp))| k.starts_with(prefix) && *exp > now)
                .count()
        }
    }

    #[async_trait]
    impl LockStore for InMemoryLockStore {
        async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: i64) -> Result<bool, StoreError> {
            let now = self.time_provider.now_millis();
            let mut entries = self.entries.lock().unwrap();
            match entries.get(key) {
                Some((_, expires_at)) if *expires_at > now => Ok(false),
                _ => {
                    entries.insert(key.to_string(), (value.to_string(), now + ttl_ms));
                    Ok(true)
                }
            }
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            let now = self.time_provider.now_millis();
            let entries = self.entries.lock().unwrap();
            Ok(entries
                .get(key)
                .filter(|(_, expires_at)| *expires_at > now)
                .map(|(value, _)| value.clone()))
        }

        async fn put(&self, key: &str, value: &str, ttl_ms: i64) -> Result<(), StoreError> {
            let now = self.time_provider.now_millis();
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), (value.to_string(), now + ttl_ms));
            Ok(())
        }
    }

    /// Wraps a store and fails the first `failures` calls with a transient error
    pub struct FlakyLockStore<S> {
        inner: S,
        remaining_failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl<S: LockStore> FlakyLockStore<S> {
        pub fn new(inner: S, failures: usize) -> Self {
            Self {
                inner,
                remaining_failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn trip(&self) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let tripped = self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if tripped {
                Err(StoreError::Transient("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl<S: LockStore> LockStore for FlakyLockStore<S> {
        async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: i64) -> Result<bool, StoreError> {
            self.trip()?;
            self.inner.set_if_absent(key, value, ttl_ms).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.trip()?;
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str, ttl_ms: i64) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.put(key, value, ttl_ms).await
        }
    }

    /// Refuses every lock under `prefix` and then fails to read it back,
    /// as when the store drops the connection between the two calls
    pub struct ReadBackFailingLockStore<S> {
        inner: S,
        prefix: String,
        failed_reads: AtomicUsize,
    }

    impl<S: LockStore> ReadBackFailingLockStore<S> {
        pub fn new(inner: S, prefix: impl Into<String>) -> Self {
            Self {
                inner,
                prefix: prefix.into(),
                failed_reads: AtomicUsize::new(0),
            }
        }

        pub fn failed_reads(&self) -> usize {
            self.failed_reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<S: LockStore> LockStore for ReadBackFailingLockStore<S> {
        async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: i64) -> Result<bool, StoreError> {
            if key.starts_with(&self.prefix) {
                return Ok(false);
            }
            self.inner.set_if_absent(key, value, ttl_ms).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if key.starts_with(&self.prefix) {
                self.failed_reads.fetch_add(1, Ordering::SeqCst);
                return Err(StoreError::Transient("connection reset".to_string()));
            }
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str, ttl_ms: i64) -> Result<(), StoreError> {
            self.inner.put(key, value, ttl_ms).await
        }
    }
}
