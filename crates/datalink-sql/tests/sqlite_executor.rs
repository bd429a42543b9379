//! SQLite-backed tests for query execution and result caching

use datalink_core::{
    ConnectionConfig, DataRow, ExecuteOptions, QueryExecutor, QueryStatus, StoreType,
};
use datalink_sql::SqlQueryExecutor;
use futures::TryStreamExt;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;
use tempfile::TempDir;

async fn metrics_database() -> (TempDir, ConnectionConfig) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.db");
    let config = ConnectionConfig::new(StoreType::Sqlite, path.to_string_lossy().to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&config.connection_url())
        .await
        .unwrap();
    sqlx::query("CREATE TABLE metrics (id INTEGER PRIMARY KEY, name TEXT, value REAL)")
        .execute(&pool)
        .await
        .unwrap();
    for (id, name, value) in [(1, "cpu", 0.5), (2, "mem", 0.75), (3, "disk", 0.25)] {
        sqlx::query("INSERT INTO metrics (id, name, value) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(value)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool.close().await;
    (dir, config)
}

const QUERY: &str = "SELECT id, name, value FROM metrics ORDER BY id";

#[tokio::test]
async fn test_second_execution_is_served_from_cache() {
    let (_dir, config) = metrics_database().await;
    let executor = SqlQueryExecutor::default();

    let first = executor
        .execute_query(QUERY, &config, ExecuteOptions::default())
        .await;
    assert_eq!(first.status, QueryStatus::Completed);
    assert!(!first.from_cache);
    assert_eq!(first.row_count, 3);
    assert_eq!(first.data[1]["name"], json!("mem"));
    let kinds: Vec<&str> = first.columns.iter().map(|c| c.kind.as_str()).collect();
    assert_eq!(kinds, vec!["int", "str", "float"]);

    let second = executor
        .execute_query(QUERY, &config, ExecuteOptions::default())
        .await;
    assert_eq!(second.status, QueryStatus::Cached);
    assert!(second.from_cache);
    assert_eq!(second.execution_time_ms, 0);
    assert_eq!(second.data, first.data);
    assert_eq!(second.columns, first.columns);
    assert!(second.cached_at.is_some());
    assert_ne!(second.execution_id, first.execution_id);

    executor.close_connection().await;
}

#[tokio::test]
async fn test_cache_bypass_and_expiry() {
    let (_dir, config) = metrics_database().await;
    let executor = SqlQueryExecutor::default();

    let uncached = executor
        .execute_query(QUERY, &config, ExecuteOptions::without_cache())
        .await;
    assert!(!uncached.from_cache);
    let again = executor
        .execute_query(QUERY, &config, ExecuteOptions::without_cache())
        .await;
    assert!(!again.from_cache);

    let expiring = ExecuteOptions::with_ttl(Duration::ZERO);
    executor.execute_query(QUERY, &config, expiring).await;
    let after_expiry = executor.execute_query(QUERY, &config, expiring).await;
    assert!(!after_expiry.from_cache);
    assert_eq!(after_expiry.status, QueryStatus::Completed);
}

#[tokio::test]
async fn test_failed_query_is_reported_not_raised() {
    let (_dir, config) = metrics_database().await;
    let executor = SqlQueryExecutor::default();

    let result = executor
        .execute_query("SELECT * FROM missing_table", &config, ExecuteOptions::default())
        .await;
    assert_eq!(result.status, QueryStatus::Failed);
    assert!(result.data.is_empty());
    assert!(result
        .error_message
        .unwrap()
        .contains("no such table"));
}

#[tokio::test]
async fn test_streaming_skips_cache() {
    let (_dir, config) = metrics_database().await;
    let executor = SqlQueryExecutor::default();

    let rows: Vec<DataRow> = executor
        .execute_query_streaming(QUERY, &config, 2)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["name"], json!("disk"));

    let next = executor
        .execute_query(QUERY, &config, ExecuteOptions::default())
        .await;
    assert!(!next.from_cache);
}

#[tokio::test]
async fn test_explain_plan_and_errors() {
    let (_dir, config) = metrics_database().await;
    let executor = SqlQueryExecutor::default();

    let plan = executor.explain_execution_plan(QUERY, &config).await;
    assert_eq!(plan["dialect"], json!("sqlite"));
    assert!(!plan["execution_plan"].as_array().unwrap().is_empty());

    let broken = executor
        .explain_execution_plan("SELECT FROM WHERE", &config)
        .await;
    assert!(broken["error"].is_string());
    assert_eq!(broken["execution_plan"], json!([]));
}

#[tokio::test]
async fn test_connection_probe() {
    let (_dir, config) = metrics_database().await;
    let executor = SqlQueryExecutor::default();
    assert!(executor.test_connection(&config).await);

    let oracle = ConnectionConfig::new(StoreType::Oracle, "orcl");
    assert!(!executor.test_connection(&oracle).await);

    let result = executor
        .execute_query("SELECT 1", &oracle, ExecuteOptions::default())
        .await;
    assert_eq!(result.status, QueryStatus::Failed);
}
