//! Static checks run before a generated or user-supplied query reaches a store

use crate::schema::entity_names;
use datalink_core::{QueryValidation, StoreFamily};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

pub const DANGEROUS_KEYWORDS: [&str; 5] = ["DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE"];

pub const KNOWN_STAGES: [&str; 12] = [
    "$match",
    "$group",
    "$sort",
    "$limit",
    "$skip",
    "$project",
    "$lookup",
    "$unwind",
    "$addFields",
    "$count",
    "$facet",
    "$sample",
];

static DANGEROUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(DROP|DELETE|TRUNCATE|ALTER|CREATE)\b").expect("static pattern")
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_$]*").expect("static pattern"));

/// Validate with the checker for `family`
pub fn validate_for(family: StoreFamily, query: &str, schema_context: &Value) -> QueryValidation {
    match family {
        StoreFamily::Relational => validate_sql(query, schema_context),
        StoreFamily::Document => validate_pipeline(query),
    }
}

/// Reject empty statements and any DDL or destructive keyword, as whole words.
///
/// Warns when the context lists tables and the query names none of them.
pub fn validate_sql(query: &str, schema_context: &Value) -> QueryValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if query.trim().is_empty() {
        errors.push("Query is empty".to_string());
        return QueryValidation::from_findings(errors, warnings);
    }

    let found: HashSet<String> = DANGEROUS
        .find_iter(query)
        .map(|m| m.as_str().to_uppercase())
        .collect();
    for keyword in DANGEROUS_KEYWORDS {
        if found.contains(keyword) {
            errors.push(format!("Query contains dangerous operation: {}", keyword));
        }
    }

    let known = entity_names(schema_context);
    if !known.is_empty() {
        let referenced: HashSet<String> = IDENTIFIER
            .find_iter(query)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if !known.iter().any(|t| referenced.contains(&t.to_lowercase())) {
            warnings.push(format!(
                "Query references none of the known tables: {}",
                known.join(", ")
            ));
        }
    }

    QueryValidation::from_findings(errors, warnings)
}

/// Check that `query` is a JSON array of single-key stage objects
pub fn validate_pipeline(query: &str) -> QueryValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let parsed: Value = match serde_json::from_str(query) {
        Ok(parsed) => parsed,
        Err(e) => {
            errors.push(format!("Invalid JSON: {}", e));
            return QueryValidation::from_findings(errors, warnings);
        }
    };
    let Some(stages) = parsed.as_array() else {
        errors.push("MongoDB pipeline must be a JSON array".to_string());
        return QueryValidation::from_findings(errors, warnings);
    };

    for stage in stages {
        match stage.as_object() {
            Some(object) if object.len() == 1 => {
                if let Some(name) = object.keys().next() {
                    if !KNOWN_STAGES.contains(&name.as_str()) {
                        warnings.push(format!("Unknown or uncommon stage: {}", name));
                    }
                }
            }
            _ => errors.push(format!("Invalid stage format: {}", stage)),
        }
    }

    QueryValidation::from_findings(errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drop_table_is_invalid_without_context() {
        for context in [json!({}), json!({"tables": [{"name": "users"}]})] {
            let validation = validate_sql("DROP TABLE users", &context);
            assert!(!validation.valid);
            assert_eq!(
                validation.errors,
                vec!["Query contains dangerous operation: DROP"]
            );
        }
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let validation = validate_sql(
            "SELECT created_at, deleted FROM users WHERE updated_by = 'x'",
            &json!({}),
        );
        assert!(validation.valid, "{:?}", validation.errors);

        let validation = validate_sql("select 1; delete from users; Truncate logs", &json!({}));
        assert_eq!(
            validation.errors,
            vec![
                "Query contains dangerous operation: DELETE",
                "Query contains dangerous operation: TRUNCATE"
            ]
        );
    }

    #[test]
    fn test_empty_query_is_invalid() {
        assert!(!validate_sql("   ", &json!({})).valid);
    }

    #[test]
    fn test_unreferenced_tables_warn() {
        let context = json!({"tables": [{"name": "Orders"}, {"name": "customers"}]});
        let validation = validate_sql("SELECT 1", &context);
        assert!(validation.valid);
        assert_eq!(validation.warnings.len(), 1);

        let validation = validate_sql("SELECT * FROM orders", &context);
        assert!(validation.warnings.is_empty());
    }

    #[test]
    fn test_pipeline_validation() {
        assert!(validate_pipeline(r#"[{"$match": {"a": 1}}, {"$limit": 5}]"#).valid);

        let invalid = validate_pipeline("{oops");
        assert!(invalid.errors[0].starts_with("Invalid JSON"));

        let not_array = validate_pipeline(r#"{"$match": {}}"#);
        assert_eq!(not_array.errors, vec!["MongoDB pipeline must be a JSON array"]);

        let bad_stage = validate_pipeline(r#"[1, {"$match": {}, "$limit": 1}]"#);
        assert_eq!(bad_stage.errors.len(), 2);

        let uncommon = validate_pipeline(r#"[{"$merge": "out"}]"#);
        assert!(uncommon.valid);
        assert_eq!(uncommon.warnings, vec!["Unknown or uncommon stage: $merge"]);
    }
}
