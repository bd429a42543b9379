use datalink_core::DataRow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Per-row condition checked by a `CHECK` constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCondition {
    NotNull,
    Min(f64),
    Max(f64),
    OneOf(Vec<Value>),
    MaxLength(usize),
}

/// Constraint definitions, tagged the way they arrive as JSON:
/// `{"type": "PRIMARY_KEY", "columns": ["id"]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Constraint {
    PrimaryKey {
        columns: Vec<String>,
    },
    ForeignKey {
        columns: Vec<String>,
        referenced_table: String,
        /// Key tuples known to exist in the referenced table
        #[serde(default)]
        referenced_values: Vec<Vec<Value>>,
    },
    Unique {
        columns: Vec<String>,
    },
    Check {
        column: String,
        condition: CheckCondition,
    },
}

/// Violations grouped by constraint kind, each message naming its row index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintViolations {
    pub primary_key_violations: Vec<String>,
    pub foreign_key_violations: Vec<String>,
    pub check_constraint_violations: Vec<String>,
    pub unique_constraint_violations: Vec<String>,
}

impl ConstraintViolations {
    pub fn total(&self) -> usize {
        self.primary_key_violations.len()
            + self.foreign_key_violations.len()
            + self.check_constraint_violations.len()
            + self.unique_constraint_violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

fn key_tuple(row: &DataRow, columns: &[String]) -> Vec<Value> {
    columns
        .iter()
        .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

fn tuple_key(tuple: &[Value]) -> String {
    Value::Array(tuple.to_vec()).to_string()
}

pub(crate) fn validate(data: &[DataRow], constraints: &[Constraint]) -> ConstraintViolations {
    let mut violations = ConstraintViolations::default();

    for constraint in constraints {
        match constraint {
            Constraint::PrimaryKey { columns } => {
                check_primary_key(data, columns, &mut violations.primary_key_violations)
            }
            Constraint::Unique { columns } => {
                check_unique(data, columns, &mut violations.unique_constraint_violations)
            }
            Constraint::ForeignKey {
                columns,
                referenced_table,
                referenced_values,
            } => check_foreign_key(
                data,
                columns,
                referenced_table,
                referenced_values,
                &mut violations.foreign_key_violations,
            ),
            Constraint::Check { column, condition } => check_condition(
                data,
                column,
                condition,
                &mut violations.check_constraint_violations,
            ),
        }
    }

    violations
}

/// Single ordered pass: the first occurrence of a key wins, later repeats and null-bearing keys
/// are each reported.
fn check_primary_key(data: &[DataRow], columns: &[String], out: &mut Vec<String>) {
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (i, row) in data.iter().enumerate() {
        let tuple = key_tuple(row, columns);
        if tuple.iter().any(Value::is_null) {
            out.push(format!("Row {}: Primary key contains null values", i));
            continue;
        }
        let key = tuple_key(&tuple);
        match seen.get(&key) {
            Some(first) => out.push(format!(
                "Row {}: Duplicate primary key value {} (first seen at row {})",
                i, key, first
            )),
            None => {
                seen.insert(key, i);
            }
        }
    }
}

fn check_unique(data: &[DataRow], columns: &[String], out: &mut Vec<String>) {
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (i, row) in data.iter().enumerate() {
        let tuple = key_tuple(row, columns);
        // NULLs never collide
        if tuple.iter().any(Value::is_null) {
            continue;
        }
        let key = tuple_key(&tuple);
        match seen.get(&key) {
            Some(first) => out.push(format!(
                "Row {}: Duplicate value {} for unique ({}) (first seen at row {})",
                i,
                key,
                columns.join(", "),
                first
            )),
            None => {
                seen.insert(key, i);
            }
        }
    }
}

fn check_foreign_key(
    data: &[DataRow],
    columns: &[String],
    referenced_table: &str,
    referenced_values: &[Vec<Value>],
    out: &mut Vec<String>,
) {
    let known: HashSet<String> = referenced_values.iter().map(|t| tuple_key(t)).collect();

    for (i, row) in data.iter().enumerate() {
        let tuple = key_tuple(row, columns);
        if tuple.iter().any(Value::is_null) {
            continue;
        }
        let key = tuple_key(&tuple);
        if !known.contains(&key) {
            out.push(format!(
                "Row {}: Foreign key {} not found in {}",
                i, key, referenced_table
            ));
        }
    }
}

fn check_condition(
    data: &[DataRow],
    column: &str,
    condition: &CheckCondition,
    out: &mut Vec<String>,
) {
    for (i, row) in data.iter().enumerate() {
        let value = row.get(column).unwrap_or(&Value::Null);
        let failed = match condition {
            CheckCondition::NotNull => value.is_null(),
            CheckCondition::Min(min) => value.as_f64().map(|v| v < *min).unwrap_or(false),
            CheckCondition::Max(max) => value.as_f64().map(|v| v > *max).unwrap_or(false),
            CheckCondition::OneOf(allowed) => !value.is_null() && !allowed.contains(value),
            CheckCondition::MaxLength(max) => value
                .as_str()
                .map(|s| s.chars().count() > *max)
                .unwrap_or(false),
        };
        if failed {
            out.push(format!(
                "Row {}: Column {} violates check {:?} (value {})",
                i, column, condition, value
            ));
        }
    }
}
