use crate::constraints::{self, Constraint, ConstraintViolations};
use crate::convert::{convert_value, encode_value, TargetEncoding};
use crate::error::{NormalizeError, Result};
use chrono::{DateTime, Utc};
use datalink_core::{DataRow, NormalizationRule, RuleType, TableMetadata};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// What to do with a null value in a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "snake_case")]
pub enum NullStrategy {
    RemoveRow,
    DefaultValue(Value),
    EmptyString,
    Zero,
}

impl NullStrategy {
    /// Read `strategy` (and `default_value`) from rule parameters
    pub fn from_rule(rule: &NormalizationRule) -> Result<Self> {
        let invalid = |reason: &str| NormalizeError::InvalidRule {
            table: rule.table_name.clone(),
            column: rule.column_name.clone(),
            reason: reason.to_string(),
        };

        match rule.parameter_str("strategy") {
            Some("remove_row") | Some("drop_row") => Ok(NullStrategy::RemoveRow),
            Some("default_value") => rule
                .parameters
                .get("default_value")
                .cloned()
                .map(NullStrategy::DefaultValue)
                .ok_or_else(|| invalid("default_value strategy without default_value")),
            Some("empty_string") => Ok(NullStrategy::EmptyString),
            Some("zero") => Ok(NullStrategy::Zero),
            Some(other) => Err(invalid(&format!("unknown null strategy {}", other))),
            None => Err(invalid("missing strategy")),
        }
    }
}

/// Descriptive comparison of a batch before and after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub timestamp: DateTime<Utc>,
    pub original_record_count: usize,
    pub normalized_record_count: usize,
    /// Negative when rows were added
    pub records_removed: i64,
    pub columns_processed: Vec<String>,
    pub columns_added: Vec<String>,
    pub columns_removed: Vec<String>,
}

/// Cross-store normalization: rule analysis over metadata and pure batch transformations.
///
/// Nothing here touches a store. Every transformation is deterministic for a given rule list,
/// so replaying a plan over the same batch gives the same output.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Declared type (upper case) -> portable target type
    type_conversions: BTreeMap<String, String>,
    /// Column name -> default used for nulls in nullable columns
    null_defaults: BTreeMap<String, Value>,
}

impl Default for Normalizer {
    fn default() -> Self {
        let type_conversions = [
            ("TINYINT(1)", "BOOLEAN"),
            ("BIT(1)", "BOOLEAN"),
            ("DATETIME", "TIMESTAMP"),
            ("DATETIME2", "TIMESTAMP"),
            ("SMALLDATETIME", "TIMESTAMP"),
            ("YEAR", "INTEGER"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        let null_defaults = [
            ("status", json!("active")),
            ("is_deleted", json!(false)),
            // resolved to the analysis time
            ("created_at", Value::Null),
        ]
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect();

        Self {
            type_conversions,
            null_defaults,
        }
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type_conversion(mut self, from: &str, to: &str) -> Self {
        self.type_conversions
            .insert(from.trim().to_uppercase(), to.to_string());
        self
    }

    pub fn with_null_default(mut self, column: &str, value: Value) -> Self {
        self.null_defaults.insert(column.to_string(), value);
        self
    }

    pub fn analyze_normalization_needs(&self, metadata: &[TableMetadata]) -> Vec<NormalizationRule> {
        self.analyze_normalization_needs_at(metadata, Utc::now())
    }

    /// Rule analysis with `now` as the captured value for time-based defaults
    pub fn analyze_normalization_needs_at(
        &self,
        metadata: &[TableMetadata],
        now: DateTime<Utc>,
    ) -> Vec<NormalizationRule> {
        let mut rules = Vec::new();

        for table in metadata {
            for column in &table.columns {
                let declared = column.data_type.trim().to_uppercase();
                if let Some(target) = self.type_conversions.get(&declared) {
                    rules.push(
                        NormalizationRule::new(&table.name, &column.name, RuleType::DataTypeConversion)
                            .with_schema(table.schema.clone())
                            .with_parameter("source_type", declared.clone())
                            .with_parameter("target_type", target.clone()),
                    );
                }

                if column.nullable {
                    if let Some(default) = self.null_defaults.get(&column.name) {
                        let default = if default.is_null() {
                            json!(now.to_rfc3339())
                        } else {
                            default.clone()
                        };
                        rules.push(
                            NormalizationRule::new(&table.name, &column.name, RuleType::NullHandling)
                                .with_schema(table.schema.clone())
                                .with_parameter("strategy", "default_value")
                                .with_parameter("default_value", default),
                        );
                    }
                }
            }
        }

        debug!(
            "Analyzed {} tables, generated {} normalization rules",
            metadata.len(),
            rules.len()
        );
        rules
    }

    /// Project every row onto the metadata's columns and convert each value to its target type.
    ///
    /// `target_type_mapping` maps column names to target types; unmapped columns use their
    /// declared type. Columns missing from a row become null.
    pub fn normalize_data_types(
        &self,
        data: &[DataRow],
        metadata: &TableMetadata,
        target_type_mapping: &BTreeMap<String, String>,
    ) -> Vec<DataRow> {
        data.iter()
            .map(|row| {
                metadata
                    .columns
                    .iter()
                    .map(|column| {
                        let value = row.get(&column.name).unwrap_or(&Value::Null);
                        let target = target_type_mapping
                            .get(&column.name)
                            .unwrap_or(&column.data_type);
                        (column.name.clone(), convert_value(value, target))
                    })
                    .collect()
            })
            .collect()
    }

    /// Apply a per-column null strategy. Only nulls present in a row are touched.
    pub fn handle_null_values(
        &self,
        data: Vec<DataRow>,
        strategies: &BTreeMap<String, NullStrategy>,
    ) -> Vec<DataRow> {
        data.into_iter()
            .filter_map(|mut row| {
                for (column, strategy) in strategies {
                    let is_null = matches!(row.get(column), Some(Value::Null));
                    if !is_null {
                        continue;
                    }
                    match strategy {
                        NullStrategy::RemoveRow => return None,
                        NullStrategy::DefaultValue(value) => {
                            row.insert(column.clone(), value.clone());
                        }
                        NullStrategy::EmptyString => {
                            row.insert(column.clone(), json!(""));
                        }
                        NullStrategy::Zero => {
                            row.insert(column.clone(), json!(0));
                        }
                    }
                }
                Some(row)
            })
            .collect()
    }

    /// Map every string value into the target character repertoire
    pub fn normalize_encoding(&self, data: Vec<DataRow>, target_encoding: &str) -> Result<Vec<DataRow>> {
        let encoding = TargetEncoding::parse(target_encoding)?;
        Ok(data
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(k, v)| {
                        let v = encode_value(&v, encoding);
                        (k, v)
                    })
                    .collect()
            })
            .collect())
    }

    pub fn validate_constraints(
        &self,
        data: &[DataRow],
        constraints: &[Constraint],
    ) -> ConstraintViolations {
        constraints::validate(data, constraints)
    }

    /// Fold `rules` left to right over the batch
    pub fn apply_business_rules(
        &self,
        data: Vec<DataRow>,
        rules: &[NormalizationRule],
    ) -> Result<Vec<DataRow>> {
        rules
            .iter()
            .try_fold(data, |batch, rule| self.apply_rule(batch, rule))
    }

    fn apply_rule(&self, data: Vec<DataRow>, rule: &NormalizationRule) -> Result<Vec<DataRow>> {
        match rule.rule_type {
            RuleType::DataTypeConversion => {
                let Some(target) = rule.parameter_str("target_type") else {
                    warn!(
                        "Conversion rule for {}.{} has no target_type, skipping",
                        rule.table_name, rule.column_name
                    );
                    return Ok(data);
                };
                Ok(map_column(data, &rule.column_name, |v| convert_value(v, target)))
            }
            RuleType::NullHandling => {
                let strategy = NullStrategy::from_rule(rule)?;
                let strategies = BTreeMap::from([(rule.column_name.clone(), strategy)]);
                Ok(self.handle_null_values(data, &strategies))
            }
            RuleType::Encoding => {
                let target = rule.parameter_str("target_encoding").unwrap_or("utf-8");
                if rule.column_name == "*" {
                    return self.normalize_encoding(data, target);
                }
                let encoding = TargetEncoding::parse(target)?;
                Ok(map_column(data, &rule.column_name, |v| encode_value(v, encoding)))
            }
            RuleType::BusinessRule => Ok(apply_action(data, rule)),
        }
    }

    pub fn generate_normalization_report(
        &self,
        original: &[DataRow],
        normalized: &[DataRow],
    ) -> NormalizationReport {
        let original_columns = column_union(original);
        let normalized_columns = column_union(normalized);

        NormalizationReport {
            timestamp: Utc::now(),
            original_record_count: original.len(),
            normalized_record_count: normalized.len(),
            records_removed: original.len() as i64 - normalized.len() as i64,
            columns_processed: normalized_columns.iter().cloned().collect(),
            columns_added: normalized_columns
                .difference(&original_columns)
                .cloned()
                .collect(),
            columns_removed: original_columns
                .difference(&normalized_columns)
                .cloned()
                .collect(),
        }
    }
}

fn column_union(data: &[DataRow]) -> BTreeSet<String> {
    data.iter().flat_map(|row| row.keys().cloned()).collect()
}

fn map_column(data: Vec<DataRow>, column: &str, f: impl Fn(&Value) -> Value) -> Vec<DataRow> {
    data.into_iter()
        .map(|mut row| {
            if let Some(value) = row.get_mut(column) {
                *value = f(value);
            }
            row
        })
        .collect()
}

fn apply_action(data: Vec<DataRow>, rule: &NormalizationRule) -> Vec<DataRow> {
    let column = rule.column_name.as_str();
    let action = rule.parameter_str("action").unwrap_or_default();

    let map_str = |data: Vec<DataRow>, f: &dyn Fn(&str) -> String| {
        map_column(data, column, |v| match v {
            Value::String(s) => Value::String(f(s)),
            other => other.clone(),
        })
    };

    match action {
        "trim" => map_str(data, &|s| s.trim().to_string()),
        "uppercase" => map_str(data, &|s| s.to_uppercase()),
        "lowercase" => map_str(data, &|s| s.to_lowercase()),
        "replace" => {
            let from = rule.parameter_str("from").unwrap_or_default().to_string();
            let to = rule.parameter_str("to").unwrap_or_default().to_string();
            if from.is_empty() {
                return data;
            }
            map_str(data, &|s| s.replace(&from, &to))
        }
        "set_default" => {
            let value = rule.parameters.get("value").cloned().unwrap_or(Value::Null);
            data.into_iter()
                .map(|mut row| {
                    let missing = row.get(column).map(Value::is_null).unwrap_or(true);
                    if missing {
                        row.insert(column.to_string(), value.clone());
                    }
                    row
                })
                .collect()
        }
        "allowed_values" => {
            let allowed: Vec<Value> = rule
                .parameters
                .get("values")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            data.into_iter()
                .filter(|row| allowed.contains(row.get(column).unwrap_or(&Value::Null)))
                .collect()
        }
        other => {
            warn!(
                "Unknown business rule action '{}' for {}.{}, skipping",
                other, rule.table_name, rule.column_name
            );
            data
        }
    }
}
