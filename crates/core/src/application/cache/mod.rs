// Cache Containers - per-operation result caching
//
// Two variants share one contract:
// - LazyContainer: computes on miss, one computation per key at a time
// - TimerLoadContainer: refreshed by the scheduler, reads never block

pub mod expiry;
pub mod lazy;
pub mod timer_load;

pub use expiry::calc_expire;
pub use lazy::{cache_op, CacheOp, LazyContainer};
pub use timer_load::TimerLoadContainer;

use crate::domain::stable_hash;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Maps an operation's arguments to a cache key
pub trait KeyStrategy: Send + Sync {
    fn key(&self, method: &str, args: &serde_json::Value) -> String;
}

/// Key is the method plus the canonical JSON of its arguments
///
/// Object fields serialize in sorted order, so equal arguments always give
/// the same key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgsKeyStrategy;

impl KeyStrategy for ArgsKeyStrategy {
    fn key(&self, method: &str, args: &serde_json::Value) -> String {
        format!("{}:{}", method, args)
    }
}

/// Key is the method plus a 64-bit hash of the arguments (bounded key size)
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedKeyStrategy;

impl KeyStrategy for HashedKeyStrategy {
    fn key(&self, method: &str, args: &serde_json::Value) -> String {
        format!("{}:{:016x}", method, stable_hash(&args.to_string()))
    }
}

/// Snapshot of a container's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
}

/// Contract shared by both container variants
pub trait CacheContainer: Send + Sync {
    /// Identity of the wrapped operation
    fn identity(&self) -> &str;

    /// Number of stored entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}

/// A stored result; replaced on refresh, never mutated
#[derive(Debug, Clone)]
pub(crate) struct CachedEntry<V> {
    pub value: Option<V>,
    pub expires_at: i64,
}

impl<V> CachedEntry<V> {
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
}

impl StatCounters {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load(&self, ok: bool) {
        if ok {
            self.loads.fetch_add(1, Ordering::Relaxed);
        } else {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
        }
    }
}
