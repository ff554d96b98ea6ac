// Lazy Container - compute on miss, single-flight per key
//
// Hit path: one dashmap read, no async lock.
// Miss path: per-key flight cell, re-check, compute once, store.
// Every caller that joined a flight gets that flight's outcome, errors included.

use super::{calc_expire, CacheContainer, CacheStats, CachedEntry, KeyStrategy, StatCounters};
use crate::domain::CachePolicy;
use crate::error::{AppError, Result};
use crate::port::{ComputeError, TimeProvider};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Wrapped operation: arguments in, optional value out
pub type CacheOp<V> = Arc<
    dyn Fn(serde_json::Value) -> BoxFuture<'static, std::result::Result<Option<V>, ComputeError>>
        + Send
        + Sync,
>;

/// Build a `CacheOp` from an async closure
pub fn cache_op<V, F, Fut>(f: F) -> CacheOp<V>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Option<V>, ComputeError>> + Send + 'static,
{
    Arc::new(move |args| {
        Box::pin(f(args)) as BoxFuture<'static, std::result::Result<Option<V>, ComputeError>>
    })
}

/// Outcome of one computation, shared by every caller that joined it
type Flight<V> = OnceCell<std::result::Result<Option<V>, ComputeError>>;

pub struct LazyContainer<V> {
    identity: String,
    policy: CachePolicy,
    key_strategy: Arc<dyn KeyStrategy>,
    time_provider: Arc<dyn TimeProvider>,
    op: CacheOp<V>,
    entries: DashMap<String, CachedEntry<V>>,
    inflight: DashMap<String, Arc<Flight<V>>>,
    stats: StatCounters,
}

impl<V> LazyContainer<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a container; an invalid policy is a configuration error
    pub fn new(
        identity: impl Into<String>,
        policy: CachePolicy,
        key_strategy: Arc<dyn KeyStrategy>,
        time_provider: Arc<dyn TimeProvider>,
        op: CacheOp<V>,
    ) -> Result<Self> {
        policy
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(Self {
            identity: identity.into(),
            policy,
            key_strategy,
            time_provider,
            op,
            entries: DashMap::new(),
            inflight: DashMap::new(),
            stats: StatCounters::default(),
        })
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Cached value for `args`, computing it at most once per key at a time
    pub async fn get(&self, args: serde_json::Value) -> std::result::Result<Option<V>, ComputeError> {
        let key = self.key_strategy.key(&self.identity, &args);
        if let Some(value) = self.lookup(&key) {
            self.stats.hit();
            return Ok(value);
        }
        self.stats.miss();

        let flight = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = flight
            .get_or_init(|| async {
                // Another flight may have filled it before ours was created
                match self.lookup(&key) {
                    Some(value) => Ok(value),
                    None => self.compute(&key, args).await,
                }
            })
            .await
            .clone();

        // Only retire our own flight; a later one may already own the key
        self.inflight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &flight));
        result
    }

    /// Drop the entry for `args`
    pub fn invalidate(&self, args: &serde_json::Value) -> bool {
        let key = self.key_strategy.key(&self.identity, args);
        self.entries.remove(&key).is_some()
    }

    fn lookup(&self, key: &str) -> Option<Option<V>> {
        let now = self.time_provider.now_millis();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    async fn compute(
        &self,
        key: &str,
        args: serde_json::Value,
    ) -> std::result::Result<Option<V>, ComputeError> {
        let outcome = AssertUnwindSafe((self.op)(args)).catch_unwind().await;
        let value = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                self.stats.load(false);
                warn!(identity = %self.identity, key = %key, error = %e, "Cache computation failed");
                return Err(e);
            }
            Err(_) => {
                self.stats.load(false);
                warn!(identity = %self.identity, key = %key, "Cache computation panicked");
                return Err(ComputeError::Panicked {
                    identity: self.identity.clone(),
                });
            }
        };
        self.stats.load(true);

        if value.is_none() && !self.policy.cache_absent {
            debug!(identity = %self.identity, key = %key, "Absent result not cached");
            return Ok(None);
        }

        let now = self.time_provider.now_millis();
        self.make_room(key, now);
        self.entries.insert(
            key.to_string(),
            CachedEntry {
                value: value.clone(),
                expires_at: calc_expire(key, self.policy.period_ms, now),
            },
        );
        Ok(value)
    }

    /// Evict expired entries first, then the soonest-expiring one
    fn make_room(&self, key: &str, now: i64) {
        if self.entries.len() < self.policy.max_entries || self.entries.contains_key(key) {
            return;
        }

        self.entries.retain(|_, entry| entry.is_live(now));
        while self.entries.len() >= self.policy.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| entry.key().clone());
            match victim {
                Some(victim) => {
                    debug!(identity = %self.identity, key = %victim, "Evicting cache entry");
                    self.entries.remove(&victim);
                }
                None => break,
            }
        }
    }
}

impl<V> CacheContainer for LazyContainer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn identity(&self) -> &str {
        &self.identity
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
