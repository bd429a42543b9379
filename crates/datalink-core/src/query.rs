use crate::traits::DataRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default TTL for cached query results
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cached,
}

/// Name and runtime kind of one result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Runtime kind of a JSON value: `str`, `int`, `float`, `bool`, `dict`, `list` or `NoneType`
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "NoneType",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_f64() => "float",
        serde_json::Value::Number(_) => "int",
        serde_json::Value::String(_) => "str",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "dict",
    }
}

/// Column descriptors derived from the first row only.
///
/// Later rows with a different shape are not reconciled.
pub fn columns_from_first_row(rows: &[DataRow]) -> Vec<ColumnDescriptor> {
    rows.first()
        .map(|row| {
            row.iter()
                .map(|(name, value)| ColumnDescriptor {
                    name: name.clone(),
                    kind: json_kind(value).to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExecutionResult {
    pub execution_id: String,
    pub status: QueryStatus,
    pub query: String,
    pub data: Vec<DataRow>,
    pub columns: Vec<ColumnDescriptor>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub from_cache: bool,
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl QueryExecutionResult {
    pub fn completed(
        query: &str,
        data: Vec<DataRow>,
        columns: Vec<ColumnDescriptor>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            status: QueryStatus::Completed,
            query: query.to_string(),
            row_count: data.len(),
            data,
            columns,
            execution_time_ms,
            from_cache: false,
            cached_at: None,
            error_message: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn cached(
        query: &str,
        data: Vec<DataRow>,
        columns: Vec<ColumnDescriptor>,
        cached_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: QueryStatus::Cached,
            from_cache: true,
            cached_at: Some(cached_at),
            ..Self::completed(query, data, columns, 0)
        }
    }

    pub fn failed(query: &str, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            status: QueryStatus::Failed,
            error_message: Some(error.into()),
            ..Self::completed(query, Vec::new(), Vec::new(), execution_time_ms)
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Options for `QueryExecutor::execute_query`
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    pub use_cache: bool,
    pub ttl: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl ExecuteOptions {
    pub fn without_cache() -> Self {
        Self {
            use_cache: false,
            ..Default::default()
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLanguage {
    Sql,
    MongodbQuery,
}

/// Output contract of a query generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub query: String,
    pub query_language: QueryLanguage,
    /// select, aggregate, filter, join, analysis
    pub query_type: String,
    pub tables_or_collections: Vec<String>,
    pub explanation: String,
    pub confidence_score: f64,
    pub warnings: Vec<String>,
    #[serde(default)]
    pub estimated_rows: Option<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Structured query validation outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl QueryValidation {
    pub fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}
