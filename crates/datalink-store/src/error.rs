//! Error types for the Redis-backed stores

use datalink_core::DataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Execution {0} already registered")]
    DuplicateExecution(String),

    #[error("Execution {execution_id} already finished with status {status}")]
    ExecutionFinished { execution_id: String, status: String },

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),
}

impl From<StoreError> for DataError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ExecutionNotFound(id) => DataError::not_found(format!("Execution {}", id)),
            other => DataError::StoreError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
