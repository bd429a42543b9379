use thiserror::Error;

/// Unified error type for ingestion and query operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Operation called before a successful `connect`
    #[error("Not connected: call connect() first")]
    NotConnected,

    /// Connection failed (authentication, network, etc.)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Query timeout
    #[error("Query timeout after {0}ms")]
    QueryTimeout(u64),

    /// Invalid query syntax or parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Schema/introspection error
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Table, collection or registry entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store type or operation without an implementation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Cache or status store failure
    #[error("Store error: {0}")]
    StoreError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DataError {
    /// Create a "not found" error with custom message
    pub fn not_found(msg: impl Into<String>) -> Self {
        DataError::NotFound(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        DataError::Unsupported(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        DataError::InvalidConfiguration(msg.into())
    }

    /// Create an invalid query error
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        DataError::InvalidQuery(msg.into())
    }

    /// True when the error comes from calling an operation before `connect`
    pub fn is_not_connected(&self) -> bool {
        matches!(self, DataError::NotConnected)
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
