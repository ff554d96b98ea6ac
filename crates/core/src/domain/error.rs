// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid schedule expression '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error("Invalid cache policy: {0}")]
    InvalidCachePolicy(String),

    #[error("Invalid task id '{0}'")]
    InvalidTaskId(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
