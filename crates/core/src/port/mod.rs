// Port Layer - Interfaces for external collaborators

pub mod alert_sink;
pub mod callback;
pub mod component;
pub mod config_source;
pub mod identity;
pub mod lock_store;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use alert_sink::{Alert, AlertSink, LogAlertSink};
pub use callback::{ComputeError, ResultHandler, TaskCallback, TaskError, TaskOutput};
pub use component::{ManagedComponent, ScheduleSource, ScheduledMethod};
pub use config_source::ConfigSource;
pub use identity::InstanceIdentity;
pub use lock_store::{LockStore, StoreError};
pub use time_provider::TimeProvider;
