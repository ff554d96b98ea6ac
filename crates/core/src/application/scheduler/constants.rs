// Scheduler constants (No magic values)

/// Longest single timer sleep; the wall clock is re-read after each slice so
/// clock corrections are noticed
pub const MAX_SLEEP_SLICE_MS: i64 = 1_000;

/// Lower bound for a cycle lock's TTL
pub const MIN_LOCK_TTL_MS: i64 = 1_000;

/// Extra lifetime of a mutex record past its lease, so a record is still
/// readable while the next cycle's owner is being decided
pub const DEFAULT_RECORD_SLACK_MS: i64 = 5_000;

/// Default jitter window before a previous owner retries the lock
pub const DEFAULT_JITTER_MIN_MS: u64 = 20;
pub const DEFAULT_JITTER_MAX_MS: u64 = 200;

/// Time given to dispatch loops to observe shutdown
pub const SHUTDOWN_GRACE_MS: u64 = 2_000;
