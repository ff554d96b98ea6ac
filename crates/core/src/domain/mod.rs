// Domain Layer - Pure scheduling and caching entities

pub mod cache_policy;
pub mod error;
pub mod hash;
pub mod mutex_record;
pub mod schedule;
pub mod task;

// Re-exports
pub use cache_policy::CachePolicy;
pub use error::DomainError;
pub use hash::stable_hash;
pub use mutex_record::MutexRecord;
pub use schedule::ScheduleExpr;
pub use task::{Exclusivity, ExecutionOutcome, TaskId, TaskInfo};
