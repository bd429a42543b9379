//! End-to-end ingestion between two SQLite databases

use datalink_core::{
    ConnectionConfig, EngineSettings, ExecutionState, InMemoryStatusStore, Ingestor,
    NormalizationRule, RuleType, StoreType,
};
use datalink_ingest::{DefaultIngestorFactory, IngestionPipeline, StaticCredentials};
use datalink_normalize::Normalizer;
use datalink_sql::SqlIngestor;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::TempDir;

async fn database(dir: &TempDir, file: &str, statements: &[&str]) -> ConnectionConfig {
    let path = dir.path().join(file);
    let config = ConnectionConfig::new(StoreType::Sqlite, path.to_string_lossy().to_string());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&config.connection_url())
        .await
        .unwrap();
    for statement in statements {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
    config
}

fn pipeline() -> IngestionPipeline {
    let settings = EngineSettings {
        batch_size: 2,
        ..Default::default()
    };
    IngestionPipeline::new(
        Arc::new(DefaultIngestorFactory::new(settings.clone())),
        Arc::new(InMemoryStatusStore::new()),
        Normalizer::new(),
        settings,
    )
}

#[tokio::test]
async fn test_sqlite_to_sqlite_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let source = database(
        &dir,
        "source.db",
        &[
            "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL, status TEXT)",
            "CREATE TABLE audit_log (id INTEGER PRIMARY KEY, message TEXT)",
            "INSERT INTO products (id, name, status) VALUES
                (1, '  lamp ', 'active'), (2, 'desk', NULL), (3, 'chair', 'retired'),
                (4, 'shelf', 'active'), (5, 'rug', NULL)",
            "INSERT INTO audit_log (id, message) VALUES (1, 'created')",
        ],
    )
    .await;
    // audit_log is missing on the target, so that table fails on load
    let target = database(
        &dir,
        "target.db",
        &["CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL, status TEXT)"],
    )
    .await;

    let pipeline = pipeline();
    let mut plan = pipeline
        .create_ingestion_plan(&source, &target, None)
        .await
        .unwrap();
    let names: Vec<&str> = plan.tables.iter().map(|t| t.table_name.as_str()).collect();
    assert_eq!(names, vec!["audit_log", "products"]);
    assert_eq!(plan.tables[1].estimated_rows, 5);
    assert_eq!(plan.tables[1].estimated_duration_minutes, 1.0);

    // status → "active" default is derived from the nullable column
    assert!(plan.normalization_rules.iter().any(|r| r.table_name == "products"
        && r.column_name == "status"
        && r.rule_type == RuleType::NullHandling));
    plan.normalization_rules.push(
        NormalizationRule::new("products", "name", RuleType::BusinessRule)
            .with_parameter("action", "trim"),
    );

    let status = pipeline
        .execute_ingestion(plan, &StaticCredentials::default(), None)
        .await;
    assert_eq!(status.status, ExecutionState::CompletedWithErrors);
    assert_eq!(status.tables_processed, 1);
    assert_eq!(status.statistics.tables_failed[0].table_name, "audit_log");
    assert_eq!(status.statistics.total_rows_inserted, 5);

    let mut reader = SqlIngestor::new(StoreType::Sqlite).unwrap();
    assert!(reader.connect(&target).await);
    let rows = reader.extract_data("products", None, 10, 0).await.unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0]["name"], json!("lamp"));
    assert_eq!(rows[1]["status"], json!("active"));
    assert_eq!(rows[2]["status"], json!("retired"));
    reader.disconnect().await;
}

#[tokio::test]
async fn test_unreachable_source_cannot_be_planned() {
    let dir = tempfile::tempdir().unwrap();
    let target = database(&dir, "target.db", &[]).await;
    let source = ConnectionConfig::new(StoreType::Sqlite, "/nonexistent/dir/source.db");

    let result = pipeline().create_ingestion_plan(&source, &target, None).await;
    assert!(result.is_err());
}
