use datalink_core::DataError;
use datalink_normalize::NormalizeError;
use thiserror::Error;

/// Errors from planning and running ingestions
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Plan error: {0}")]
    PlanError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
