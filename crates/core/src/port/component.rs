// Managed Component Port
// Components declare their recurring methods explicitly instead of being
// discovered through reflection.

use super::callback::TaskCallback;
use crate::domain::Exclusivity;

/// Where a scheduled method's expression comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSource {
    /// Expression given inline
    Literal(String),
    /// Expression read from configuration at registration time
    ConfigKey(String),
}

/// One recurring method of a component
pub struct ScheduledMethod {
    pub method: String,
    pub schedule: ScheduleSource,
    pub exclusivity: Exclusivity,
    pub report_overrun: bool,
    pub callback: TaskCallback,
}

impl ScheduledMethod {
    pub fn new(method: impl Into<String>, schedule: ScheduleSource, callback: TaskCallback) -> Self {
        Self {
            method: method.into(),
            schedule,
            exclusivity: Exclusivity::None,
            report_overrun: true,
            callback,
        }
    }

    pub fn cluster_exclusive(mut self) -> Self {
        self.exclusivity = Exclusivity::ClusterExclusive;
        self
    }

    pub fn report_overrun(mut self, report: bool) -> Self {
        self.report_overrun = report;
        self
    }
}

/// Application object that owns scheduled methods
pub trait ManagedComponent: Send + Sync {
    /// Stable, fully-qualified name; registration order sorts on it
    fn name(&self) -> &str;

    fn scheduled_methods(&self) -> Vec<ScheduledMethod>;
}
