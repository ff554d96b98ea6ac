//! RPC Request/Response Types

use cadence_core::domain::TaskInfo;
use serde::{Deserialize, Serialize};

/// scheduler.tasks.v1 - List registered tasks
#[derive(Debug, Default, Deserialize)]
pub struct ListTasksRequest {
    /// Only tasks whose id starts with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResponse {
    pub instance: String,
    pub tasks: Vec<TaskInfo>,
}

/// scheduler.task.v1 - Describe one task
#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub instance: String,
    pub task: TaskInfo,
}

/// admin.health.v1 - Liveness and identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance: String,
    pub uptime_seconds: u64,
    pub task_count: usize,
    pub running_count: usize,
}
