//! Deterministic keyword-matching generators used when no language model is configured

use crate::schema::entity_names;
use crate::validation::{validate_pipeline, validate_sql};
use async_trait::async_trait;
use datalink_core::{GeneratedQuery, QueryLanguage, QueryValidation, Result, StoreType};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const FALLBACK_EXPLANATION: &str = "Generated using pattern matching (LLM unavailable)";
pub const FALLBACK_WARNING: &str = "Generated without LLM - may need manual adjustment";
const FALLBACK_CONFIDENCE: f64 = 0.5;
const FALLBACK_ESTIMATED_ROWS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Count,
    Average,
    Sum,
    GroupBy,
    Browse,
}

fn mentions(request: &str, words: &[&str]) -> bool {
    words.iter().any(|w| request.contains(w))
}

/// Substring matching on the lower-cased request, first match wins
fn classify(request: &str, allow_group_by: bool) -> Intent {
    let request = request.to_lowercase();
    if mentions(&request, &["count", "how many", "number of"]) {
        Intent::Count
    } else if mentions(&request, &["average", "avg", "mean"]) {
        Intent::Average
    } else if mentions(&request, &["sum", "total"]) {
        Intent::Sum
    } else if allow_group_by && mentions(&request, &["group", "by"]) {
        Intent::GroupBy
    } else {
        Intent::Browse
    }
}

fn first_entity(schema_context: &Value, placeholder: &str) -> String {
    entity_names(schema_context)
        .into_iter()
        .next()
        .unwrap_or_else(|| placeholder.to_string())
}

fn fallback_query(
    query: String,
    language: QueryLanguage,
    query_type: &str,
    target: String,
    request: &str,
    mut metadata: BTreeMap<String, Value>,
) -> GeneratedQuery {
    metadata.insert("generator".to_string(), json!("fallback"));
    metadata.insert("original_query".to_string(), json!(request));
    GeneratedQuery {
        query,
        query_language: language,
        query_type: query_type.to_string(),
        tables_or_collections: vec![target],
        explanation: FALLBACK_EXPLANATION.to_string(),
        confidence_score: FALLBACK_CONFIDENCE,
        warnings: vec![FALLBACK_WARNING.to_string()],
        estimated_rows: Some(FALLBACK_ESTIMATED_ROWS),
        metadata,
    }
}

/// SQL fallback targeting the first table of the schema context
#[derive(Debug, Clone)]
pub struct FallbackSqlGenerator {
    store_type: StoreType,
}

impl FallbackSqlGenerator {
    pub fn new(store_type: StoreType) -> Self {
        Self { store_type }
    }
}

impl Default for FallbackSqlGenerator {
    fn default() -> Self {
        Self::new(StoreType::Postgresql)
    }
}

#[async_trait]
impl datalink_core::QueryGenerator for FallbackSqlGenerator {
    fn query_language(&self) -> QueryLanguage {
        QueryLanguage::Sql
    }

    async fn generate_query(
        &self,
        natural_language_query: &str,
        schema_context: &Value,
        _additional_context: Option<&Value>,
    ) -> Result<GeneratedQuery> {
        let table = first_entity(schema_context, "table_name");
        let (sql, query_type) = match classify(natural_language_query, false) {
            Intent::Count => (format!("SELECT COUNT(*) as count FROM {}", table), "aggregate"),
            Intent::Average => (
                format!("SELECT AVG(value_column) as average FROM {}", table),
                "aggregate",
            ),
            Intent::Sum => (
                format!("SELECT SUM(value_column) as total FROM {}", table),
                "aggregate",
            ),
            Intent::GroupBy | Intent::Browse => {
                (format!("SELECT * FROM {} LIMIT 100", table), "select")
            }
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("dialect".to_string(), json!(self.store_type.as_str()));
        Ok(fallback_query(
            sql,
            QueryLanguage::Sql,
            query_type,
            table,
            natural_language_query,
            metadata,
        ))
    }

    fn validate_query(&self, query: &str, schema_context: &Value) -> QueryValidation {
        validate_sql(query, schema_context)
    }

    async fn explain_query(&self, query: &str) -> String {
        describe_sql(query)
    }
}

/// Aggregation-pipeline fallback targeting the first collection of the schema context
#[derive(Debug, Clone, Default)]
pub struct FallbackMongoGenerator;

impl FallbackMongoGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl datalink_core::QueryGenerator for FallbackMongoGenerator {
    fn query_language(&self) -> QueryLanguage {
        QueryLanguage::MongodbQuery
    }

    async fn generate_query(
        &self,
        natural_language_query: &str,
        schema_context: &Value,
        _additional_context: Option<&Value>,
    ) -> Result<GeneratedQuery> {
        let collection = first_entity(schema_context, "collection");
        let (pipeline, query_type) = match classify(natural_language_query, true) {
            Intent::Count => (json!([{"$count": "total"}]), "aggregate"),
            Intent::Average => (
                json!([
                    {"$group": {"_id": null, "average": {"$avg": "$value"}}},
                    {"$project": {"_id": 0, "average": 1}}
                ]),
                "aggregate",
            ),
            Intent::Sum => (
                json!([
                    {"$group": {"_id": null, "total": {"$sum": "$value"}}},
                    {"$project": {"_id": 0, "total": 1}}
                ]),
                "aggregate",
            ),
            Intent::GroupBy => (
                json!([
                    {"$group": {"_id": "$category", "count": {"$sum": 1}}},
                    {"$sort": {"count": -1}},
                    {"$limit": 100}
                ]),
                "aggregate",
            ),
            Intent::Browse => (json!([{"$limit": 100}]), "filter"),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("collection".to_string(), json!(collection));
        metadata.insert("pipeline_stages".to_string(), json!(stage_count(&pipeline)));
        Ok(fallback_query(
            serde_json::to_string(&pipeline)?,
            QueryLanguage::MongodbQuery,
            query_type,
            collection,
            natural_language_query,
            metadata,
        ))
    }

    fn validate_query(&self, query: &str, _schema_context: &Value) -> QueryValidation {
        validate_pipeline(query)
    }

    async fn explain_query(&self, query: &str) -> String {
        describe_pipeline(query)
    }
}

fn stage_count(pipeline: &Value) -> usize {
    pipeline.as_array().map_or(0, Vec::len)
}

static FROM_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\s+([\w.]+)").expect("static pattern"));
static LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+)").expect("static pattern"));
static AGGREGATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(COUNT|SUM|AVG|MIN|MAX)\s*\(").expect("static pattern")
});
static CLAUSES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bJOIN\b", "joins related tables"),
        (r"(?i)\bWHERE\b", "filters rows"),
        (r"(?i)\bGROUP\s+BY\b", "groups rows"),
        (r"(?i)\bHAVING\b", "filters groups"),
        (r"(?i)\bORDER\s+BY\b", "sorts the result"),
    ]
    .into_iter()
    .map(|(pattern, text)| (Regex::new(pattern).expect("static pattern"), text))
    .collect()
});

/// Plain-English outline of a SQL statement from the clauses it contains
pub fn describe_sql(query: &str) -> String {
    let trimmed = query.trim();
    let Some(verb) = trimmed.split_whitespace().next() else {
        return "Empty query".to_string();
    };

    let mut parts = Vec::new();
    let head = match verb.to_uppercase().as_str() {
        "SELECT" | "WITH" => "Reads rows".to_string(),
        other => format!("Runs a {} statement", other),
    };
    parts.push(match FROM_TABLE.captures(trimmed) {
        Some(caps) => format!("{} from {}", head, &caps[1]),
        None => head,
    });

    let mut aggregates: Vec<String> = AGGREGATE
        .captures_iter(trimmed)
        .map(|caps| caps[1].to_uppercase())
        .collect();
    aggregates.dedup();
    if !aggregates.is_empty() {
        parts.push(format!("computes {}", aggregates.join(", ")));
    }

    for (pattern, text) in CLAUSES.iter() {
        if pattern.is_match(trimmed) {
            parts.push(text.to_string());
        }
    }
    if let Some(caps) = LIMIT.captures(trimmed) {
        parts.push(format!("returns at most {} rows", &caps[1]));
    }

    parts.join("; ")
}

/// One line per stage of an aggregation pipeline
pub fn describe_pipeline(query: &str) -> String {
    let stages = match serde_json::from_str::<Value>(query) {
        Ok(Value::Array(stages)) => stages,
        Ok(_) => return "MongoDB pipeline must be a JSON array".to_string(),
        Err(e) => return format!("Invalid JSON: {}", e),
    };
    if stages.is_empty() {
        return "Returns every document unchanged".to_string();
    }

    stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            let Some((name, body)) = stage.as_object().and_then(|o| o.iter().next()) else {
                return format!("Stage {}: invalid stage", i + 1);
            };
            format!("Stage {} ({}): {}", i + 1, name, describe_stage(name, body))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_stage(name: &str, body: &Value) -> String {
    match name {
        "$match" => "filters documents".to_string(),
        "$group" => match body.get("_id") {
            Some(Value::String(key)) => format!("groups documents by {}", key),
            _ => "aggregates all documents into one group".to_string(),
        },
        "$sort" => "sorts documents".to_string(),
        "$limit" => format!("keeps at most {} documents", body),
        "$skip" => format!("skips {} documents", body),
        "$project" => "reshapes fields".to_string(),
        "$lookup" => match body.get("from").and_then(Value::as_str) {
            Some(from) => format!("joins documents from {}", from),
            None => "joins documents from another collection".to_string(),
        },
        "$unwind" => "expands an array field into one document per element".to_string(),
        "$addFields" => "adds computed fields".to_string(),
        "$count" => format!("counts documents into {}", body),
        "$facet" => "runs parallel sub-pipelines".to_string(),
        "$sample" => "draws a random sample".to_string(),
        other => format!("applies {}", other),
    }
}
