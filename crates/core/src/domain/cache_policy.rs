// Cache Policy

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Default nominal period (60s)
pub const DEFAULT_CACHE_PERIOD_MS: i64 = 60_000;

/// Default capacity per container
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Per-container caching policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Nominal period; entries expire on a time-aligned boundary inside it
    pub period_ms: i64,
    /// Whether an absent (`None`) result may be stored
    pub cache_absent: bool,
    /// Capacity bound; oldest-expiring entries are evicted past it
    pub max_entries: usize,
}

impl CachePolicy {
    pub fn new(period_ms: i64) -> Self {
        Self {
            period_ms,
            ..Self::default()
        }
    }

    pub fn with_cache_absent(mut self, cache_absent: bool) -> Self {
        self.cache_absent = cache_absent;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_ms <= 0 {
            return Err(DomainError::InvalidCachePolicy(format!(
                "period must be positive, got {}ms",
                self.period_ms
            )));
        }
        if self.max_entries == 0 {
            return Err(DomainError::InvalidCachePolicy(
                "max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_CACHE_PERIOD_MS,
            cache_absent: false,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}
