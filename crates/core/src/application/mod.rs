// Application Layer - Scheduling and caching services

pub mod cache;
pub mod registration;
pub mod retry;
pub mod scheduler;
pub mod shutdown;

// Re-exports
pub use cache::{
    cache_op, ArgsKeyStrategy, CacheContainer, CacheOp, CacheStats, HashedKeyStrategy, KeyStrategy, LazyContainer,
    TimerLoadContainer,
};
pub use registration::register_components;
pub use retry::StoreRetry;
pub use scheduler::{SchedulerConfig, SchedulerDeps, TaskScheduler, TaskSpec};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
