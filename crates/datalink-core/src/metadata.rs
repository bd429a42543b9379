use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-field tallies behind an inferred document-store column.
///
/// Document metadata is inferred from a random sample, so `data_type` and `nullable` on the
/// owning [`ColumnMetadata`] are probabilistic. These counters let callers judge how much.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSampleStats {
    /// Documents in the sample that contain the field
    pub present_count: u64,
    /// Documents where the field is present and null
    pub null_count: u64,
    /// Documents actually drawn
    pub sample_size: u64,
    /// Observed type name -> occurrences
    pub type_counts: BTreeMap<String, u64>,
}

/// One column of a table or one field of a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Engine-native type tag, e.g. `VARCHAR(255)`, `ObjectId`, `Int32`
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampled: Option<FieldSampleStats>,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default: None,
            auto_increment: false,
            sampled: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub referred_table: String,
    #[serde(default)]
    pub referred_schema: Option<String>,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Index method or key kind (btree, hash, 2dsphere, text, ...)
    #[serde(default)]
    pub kind: Option<String>,
}

/// Normalized description of one table or document collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
    /// Exact for relational stores, counted at sampling time for documents
    #[serde(default)]
    pub row_count: u64,
}

impl TableMetadata {
    pub fn new(name: impl Into<String>, schema: Option<String>) -> Self {
        Self {
            name: name.into(),
            schema,
            columns: Vec::new(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            row_count: 0,
        }
    }

    /// `schema.name` when a schema is set
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Drop primary-key names that do not belong to a known column
    pub fn retain_known_primary_keys(&mut self) {
        let names: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();
        self.primary_keys.retain(|pk| names.contains(pk));
    }
}

/// Outcome of `validate_data_integrity`: problems are data, not control flow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub table_name: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub statistics: BTreeMap<String, serde_json::Value>,
}

impl IntegrityReport {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn stat(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.statistics.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name() {
        let table = TableMetadata::new("orders", Some("public".to_string()));
        assert_eq!(table.qualified_name(), "public.orders");
        assert_eq!(TableMetadata::new("orders", None).qualified_name(), "orders");
    }

    #[test]
    fn test_primary_keys_subset_of_columns() {
        let mut table = TableMetadata::new("orders", None);
        table.columns.push(ColumnMetadata::new("id", "INTEGER", false));
        table.primary_keys = vec!["id".to_string(), "ghost".to_string()];
        table.retain_known_primary_keys();
        assert_eq!(table.primary_keys, vec!["id".to_string()]);
    }

    #[test]
    fn test_integrity_report_stats() {
        let mut report = IntegrityReport::new("orders");
        report.stat("total_rows", 10u64);
        assert!(report.is_clean());
        assert_eq!(report.statistics["total_rows"], serde_json::json!(10));
    }
}
