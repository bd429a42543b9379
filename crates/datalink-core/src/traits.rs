use crate::config::{ConnectionConfig, StoreFamily, StoreType};
use crate::error::Result;
use crate::metadata::{IntegrityReport, TableMetadata};
use crate::query::{ExecuteOptions, GeneratedQuery, QueryExecutionResult, QueryLanguage, QueryValidation};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A single row or document, with JSON-safe values in column order
pub type DataRow = serde_json::Map<String, serde_json::Value>;

/// Lazy, finite, non-restartable sequence of rows.
///
/// Store errors arrive as `Err` items. Dropping the stream releases its cursor.
pub type RowStream = BoxStream<'static, Result<DataRow>>;

/// Result of writing one batch into a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub inserted: u64,
    pub failed: u64,
    /// First few row-level errors, for diagnostics
    pub errors: Vec<String>,
}

impl LoadOutcome {
    pub const MAX_ERRORS: usize = 10;

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.failed += 1;
        if self.errors.len() < Self::MAX_ERRORS {
            self.errors.push(error.into());
        }
    }
}

/// Connects to one data store and exposes schema discovery plus extraction.
///
/// An ingestor is bound to its store type at construction. Every operation other than
/// `connect`, `disconnect` and `test_connection` returns [`DataError::NotConnected`] until
/// `connect` has succeeded.
///
/// [`DataError::NotConnected`]: crate::DataError::NotConnected
#[async_trait]
pub trait Ingestor: Send + Sync {
    fn store_type(&self) -> StoreType;

    /// Open a pooled connection. Failures are logged and reported as `false`.
    async fn connect(&mut self, config: &ConnectionConfig) -> bool;

    /// Release pooled resources. Safe to call repeatedly.
    async fn disconnect(&mut self);

    /// Probe `config` with a throwaway connection that is always closed
    async fn test_connection(&self, config: &ConnectionConfig) -> bool;

    /// All tables/views or collections. Entities whose metadata cannot be read are skipped.
    async fn discover_schema(&self) -> Result<Vec<TableMetadata>>;

    async fn get_table_metadata(&self, table: &str, schema: Option<&str>) -> Result<TableMetadata>;

    /// One deterministic page of rows
    async fn extract_data(
        &self,
        table: &str,
        schema: Option<&str>,
        batch_size: usize,
        offset: usize,
    ) -> Result<Vec<DataRow>>;

    /// Stream the whole table, fetching `batch_size` rows at a time
    async fn extract_data_streaming(
        &self,
        table: &str,
        schema: Option<&str>,
        batch_size: usize,
    ) -> Result<RowStream>;

    /// Integrity findings. Only `NotConnected` is returned as an error.
    async fn validate_data_integrity(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<IntegrityReport>;

    /// Write a normalized batch into an existing `table`.
    ///
    /// Fields the target does not declare are dropped. Row-level failures are counted in the
    /// outcome; only connection-level problems are returned as errors.
    async fn load_batch(
        &self,
        table: &str,
        schema: Option<&str>,
        rows: &[DataRow],
    ) -> Result<LoadOutcome>;
}

/// Runs fully-formed queries and caches their results
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    fn store_family(&self) -> StoreFamily;

    /// Never returns an error: failures come back as a `failed` result
    async fn execute_query(
        &self,
        query: &str,
        config: &ConnectionConfig,
        options: ExecuteOptions,
    ) -> QueryExecutionResult;

    /// Stream results without touching the cache
    async fn execute_query_streaming(
        &self,
        query: &str,
        config: &ConnectionConfig,
        batch_size: usize,
    ) -> Result<RowStream>;

    /// Engine-native plan, or `{"error": ..., "execution_plan": []}`
    async fn explain_execution_plan(&self, query: &str, config: &ConnectionConfig) -> serde_json::Value;

    async fn test_connection(&self, config: &ConnectionConfig) -> bool;

    async fn close_connection(&self);
}

/// Natural language to query translation.
///
/// Implementations live outside this workspace; the deterministic fallbacks in
/// `datalink-query` are used when none is configured.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    fn query_language(&self) -> QueryLanguage;

    async fn generate_query(
        &self,
        natural_language_query: &str,
        schema_context: &serde_json::Value,
        additional_context: Option<&serde_json::Value>,
    ) -> Result<GeneratedQuery>;

    fn validate_query(&self, query: &str, schema_context: &serde_json::Value) -> QueryValidation;

    /// Human-readable description of what `query` does
    async fn explain_query(&self, query: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_outcome_caps_error_list() {
        let mut outcome = LoadOutcome::default();
        for i in 0..25 {
            outcome.record_failure(format!("row {}", i));
        }
        assert_eq!(outcome.failed, 25);
        assert_eq!(outcome.errors.len(), LoadOutcome::MAX_ERRORS);
    }
}
