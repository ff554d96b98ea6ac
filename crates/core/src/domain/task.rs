// Scheduled Task Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task identity, typically "componentName.methodName"
pub type TaskId = String;

/// Whether a task may run on every instance or on one instance per cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Exclusivity {
    #[default]
    None,
    ClusterExclusive,
}

impl fmt::Display for Exclusivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusivity::None => write!(f, "NONE"),
            Exclusivity::ClusterExclusive => write!(f, "CLUSTER_EXCLUSIVE"),
        }
    }
}

/// What happened to one firing of a task on this instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionOutcome {
    /// Callback ran and succeeded
    Completed,
    /// Callback ran and failed (or panicked)
    Failed,
    /// Previous cycle still running
    SkippedOverrun,
    /// Another instance owns this cycle
    SkippedNotOwner,
    /// Lock store unreachable after retries
    SkippedStoreUnavailable,
}

impl ExecutionOutcome {
    pub fn invoked_callback(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed | ExecutionOutcome::Failed)
    }
}

/// Read-only snapshot of a registered task (introspection surface)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub schedule: String,
    pub exclusivity: Exclusivity,
    pub last_start: Option<i64>, // epoch ms
    pub last_cost_ms: Option<i64>,
    pub next_start: Option<i64>,
    pub running: bool,
    /// Current cycle owner from the shared store (cluster-exclusive only)
    pub owner: Option<String>,
}

/// Validate a task identity
pub fn validate_task_id(id: &str) -> super::error::Result<()> {
    if id.trim().is_empty() {
        return Err(super::DomainError::InvalidTaskId(id.to_string()));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(super::DomainError::InvalidTaskId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusivity_serde() {
        let json = serde_json::to_string(&Exclusivity::ClusterExclusive).unwrap();
        assert_eq!(json, "\"CLUSTER_EXCLUSIVE\"");
        assert_eq!(Exclusivity::ClusterExclusive.to_string(), "CLUSTER_EXCLUSIVE");
    }

    #[test]
    fn test_outcome_invoked_callback() {
        assert!(ExecutionOutcome::Failed.invoked_callback());
        assert!(!ExecutionOutcome::SkippedOverrun.invoked_callback());
        assert!(!ExecutionOutcome::SkippedNotOwner.invoked_callback());
    }

    #[test]
    fn test_validate_task_id() {
        assert!(validate_task_id("report.daily").is_ok());
        assert!(validate_task_id("").is_err());
        assert!(validate_task_id("report daily").is_err());
    }
}
