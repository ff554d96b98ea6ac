// Callback Port
// Task bodies and cache operations are supplied by the application as
// zero-argument async closures.

use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a task body; isolated to one cycle of one task
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TaskError(pub String);

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Failure of a cache container's wrapped operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    #[error("Operation '{identity}' failed: {message}")]
    Failed { identity: String, message: String },

    #[error("Operation '{identity}' panicked")]
    Panicked { identity: String },
}

/// Type-erased result of a task body, delivered to the result handler
pub type TaskOutput = Box<dyn Any + Send>;

/// Task body
pub type TaskCallback =
    Arc<dyn Fn() -> BoxFuture<'static, Result<TaskOutput, TaskError>> + Send + Sync>;

/// Receives the output of each successful firing
pub type ResultHandler = Arc<dyn Fn(TaskOutput) + Send + Sync>;

/// Build a task body from an async closure without a result
///
/// # Example
/// ```text
/// let cb = task_fn(move || async move {
///     purge_old_rows().await.map_err(|e| TaskError::new(e.to_string()))
/// });
/// ```
pub fn task_fn<F, Fut>(f: F) -> TaskCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Arc::new(move || {
        let fut = f();
        Box::pin(async move { fut.await.map(|()| Box::new(()) as TaskOutput) })
            as BoxFuture<'static, Result<TaskOutput, TaskError>>
    })
}

/// Build a task body whose value is handed to the result handler
pub fn producing_task_fn<F, Fut, T>(f: F) -> TaskCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
    T: Send + 'static,
{
    Arc::new(move || {
        let fut = f();
        Box::pin(async move { fut.await.map(|value| Box::new(value) as TaskOutput) })
            as BoxFuture<'static, Result<TaskOutput, TaskError>>
    })
}
