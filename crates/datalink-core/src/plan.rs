//! Ingestion plan and execution status records
//!
//! Plain serde structures: a plan is produced once from live discovery and executed once, a
//! status is the live then terminal record of one run.

use crate::config::RedactedConnectionConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of transformation a normalization rule performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    DataTypeConversion,
    NullHandling,
    BusinessRule,
    Encoding,
}

/// Declarative instruction for transforming one column during ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRule {
    pub table_name: String,
    /// Schema of the table; `None` applies the rule to the table in any schema
    #[serde(default)]
    pub schema: Option<String>,
    pub column_name: String,
    pub rule_type: RuleType,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl NormalizationRule {
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        rule_type: RuleType,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            schema: None,
            column_name: column_name.into(),
            rule_type,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    /// Whether the rule targets `table_name` in `schema`
    pub fn applies_to(&self, table_name: &str, schema: Option<&str>) -> bool {
        self.table_name == table_name
            && (self.schema.is_none() || self.schema.as_deref() == schema)
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

/// Per-table work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePlan {
    pub table_name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub estimated_rows: u64,
    pub has_primary_key: bool,
    pub has_foreign_keys: bool,
    pub estimated_duration_minutes: f64,
}

/// Immutable description of ingestion work, produced by `create_ingestion_plan`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionPlan {
    pub plan_id: String,
    pub created_at: DateTime<Utc>,
    pub source_config: RedactedConnectionConfig,
    pub target_config: RedactedConnectionConfig,
    pub tables: Vec<TablePlan>,
    pub normalization_rules: Vec<NormalizationRule>,
    pub total_estimated_rows: u64,
    pub total_estimated_duration_minutes: f64,
}

impl IngestionPlan {
    /// Rules scoped to one table, in plan order
    pub fn rules_for(&self, table_name: &str, schema: Option<&str>) -> Vec<NormalizationRule> {
        self.normalization_rules
            .iter()
            .filter(|rule| rule.applies_to(table_name, schema))
            .cloned()
            .collect()
    }
}

/// Execution state machine: `running -> completed | completed_with_errors | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Running => "running",
            ExecutionState::Completed => "completed",
            ExecutionState::CompletedWithErrors => "completed_with_errors",
            ExecutionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCompletion {
    pub table_name: String,
    pub rows_processed: u64,
    pub rows_inserted: u64,
    pub rows_failed: u64,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFailure {
    pub table_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub total_rows_processed: u64,
    pub total_rows_inserted: u64,
    pub total_rows_failed: u64,
    pub processing_rate_rows_per_second: f64,
    pub tables_completed: Vec<TableCompletion>,
    pub tables_failed: Vec<TableFailure>,
    pub total_processing_time_seconds: f64,
}

/// Live, then terminal, record of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub execution_id: String,
    pub plan_id: String,
    pub status: ExecutionState,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub tables_processed: usize,
    pub total_tables: usize,
    #[serde(default)]
    pub current_table: Option<String>,
    pub current_progress_pct: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub statistics: ExecutionStatistics,
}

impl ExecutionStatus {
    pub fn start(
        execution_id: impl Into<String>,
        plan_id: impl Into<String>,
        total_tables: usize,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            plan_id: plan_id.into(),
            status: ExecutionState::Running,
            start_time: Utc::now(),
            end_time: None,
            tables_processed: 0,
            total_tables,
            current_table: None,
            current_progress_pct: 0.0,
            errors: Vec::new(),
            warnings: Vec::new(),
            statistics: ExecutionStatistics::default(),
        }
    }

    /// Close the run. Timing and throughput are derived from `start_time`.
    pub fn finish(&mut self, state: ExecutionState) {
        let end = Utc::now();
        let elapsed = (end - self.start_time).num_milliseconds().max(0) as f64 / 1000.0;

        self.status = state;
        self.end_time = Some(end);
        self.current_table = None;
        self.statistics.total_processing_time_seconds = elapsed;
        self.statistics.processing_rate_rows_per_second = if elapsed > 0.0 {
            self.statistics.total_rows_processed as f64 / elapsed
        } else {
            0.0
        };
    }
}
