//! RPC Method Handlers

use crate::error::to_rpc_error;
use crate::types::{HealthResponse, ListTasksRequest, ListTasksResponse, TaskRequest, TaskResponse};
use cadence_core::application::TaskScheduler;
use cadence_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use std::time::Instant;

/// RPC Handler over one scheduler instance
pub struct RpcHandler {
    scheduler: TaskScheduler,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(scheduler: TaskScheduler) -> Self {
        Self {
            scheduler,
            start_time: Instant::now(),
        }
    }

    /// scheduler.tasks.v1
    pub async fn list_tasks(&self, params: ListTasksRequest) -> Result<ListTasksResponse, ErrorObjectOwned> {
        let mut tasks = self.scheduler.list_tasks().await;
        if let Some(prefix) = params.prefix.as_deref() {
            tasks.retain(|t| t.id.starts_with(prefix));
        }

        Ok(ListTasksResponse {
            instance: self.scheduler.identity().owner_id(),
            tasks,
        })
    }

    /// scheduler.task.v1
    pub async fn task(&self, params: TaskRequest) -> Result<TaskResponse, ErrorObjectOwned> {
        if params.task_id.trim().is_empty() {
            return Err(to_rpc_error(AppError::Validation(
                "task_id must not be empty".to_string(),
            )));
        }

        let task = self.scheduler.task(&params.task_id).ok_or_else(|| {
            to_rpc_error(AppError::NotFound(format!("Task {} not found", params.task_id)))
        })?;

        Ok(TaskResponse {
            instance: self.scheduler.identity().owner_id(),
            task: self.scheduler.describe(&task).await,
        })
    }

    /// admin.health.v1
    pub async fn health(&self) -> Result<HealthResponse, ErrorObjectOwned> {
        let tasks = self.scheduler.tasks();
        Ok(HealthResponse {
            status: "ok".to_string(),
            version: cadence_core::VERSION.to_string(),
            instance: self.scheduler.identity().owner_id(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            task_count: tasks.len(),
            running_count: tasks.iter().filter(|t| t.is_running()).count(),
        })
    }
}
