// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Fatal at startup: duplicate task id, bad schedule, bad cache policy
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock store error: {0}")]
    Store(#[from] crate::port::StoreError),

    #[error("Compute error: {0}")]
    Compute(#[from] crate::port::ComputeError),

    #[error("Task execution error: {0}")]
    Execution(#[from] crate::port::TaskError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
