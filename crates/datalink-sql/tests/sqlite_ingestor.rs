//! SQLite-backed tests for the relational ingestor

use datalink_core::{ConnectionConfig, DataError, DataRow, Ingestor, StoreType};
use datalink_sql::SqlIngestor;
use futures::TryStreamExt;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

async fn seeded_database() -> (TempDir, ConnectionConfig) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    let config = ConnectionConfig::new(StoreType::Sqlite, path.to_string_lossy().to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&config.connection_url())
        .await
        .unwrap();

    for statement in [
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
        "CREATE UNIQUE INDEX idx_customers_email ON customers (email)",
        "CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL REFERENCES customers(id),
            total REAL,
            placed_at TEXT
        )",
        "CREATE TABLE events (kind TEXT, payload TEXT)",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    for i in 1..=7 {
        sqlx::query("INSERT INTO customers (id, name, email) VALUES (?, ?, ?)")
            .bind(i)
            .bind(format!("customer {}", i))
            .bind(if i % 3 == 0 { None } else { Some(format!("c{}@example.com", i)) })
            .execute(&pool)
            .await
            .unwrap();
    }
    for i in 1..=3 {
        sqlx::query("INSERT INTO orders (id, customer_id, total, placed_at) VALUES (?, ?, ?, ?)")
            .bind(i)
            .bind(i)
            .bind(10.5 * i as f64)
            .bind("2024-03-01T10:00:00")
            .execute(&pool)
            .await
            .unwrap();
    }
    for kind in ["b", "a", "c", "a"] {
        sqlx::query("INSERT INTO events (kind, payload) VALUES (?, ?)")
            .bind(kind)
            .bind("{}")
            .execute(&pool)
            .await
            .unwrap();
    }

    pool.close().await;
    (dir, config)
}

async fn connected(config: &ConnectionConfig) -> SqlIngestor {
    let mut ingestor = SqlIngestor::new(StoreType::Sqlite).unwrap();
    assert!(ingestor.connect(config).await);
    ingestor
}

fn ids(rows: &[DataRow]) -> Vec<i64> {
    rows.iter().filter_map(|r| r["id"].as_i64()).collect()
}

#[tokio::test]
async fn test_discover_schema_reads_keys_and_indexes() {
    let (_dir, config) = seeded_database().await;
    let ingestor = connected(&config).await;

    let tables = ingestor.discover_schema().await.unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["customers", "events", "orders"]);

    let customers = &tables[0];
    assert_eq!(customers.row_count, 7);
    assert_eq!(customers.primary_keys, vec!["id"]);
    assert!(customers.column("id").unwrap().auto_increment);
    assert!(!customers.column("name").unwrap().nullable);
    assert!(customers.column("email").unwrap().nullable);
    assert_eq!(customers.indexes.len(), 1);
    assert!(customers.indexes[0].unique);
    assert_eq!(customers.indexes[0].columns, vec!["email"]);

    let orders = &tables[2];
    assert_eq!(orders.foreign_keys.len(), 1);
    assert_eq!(orders.foreign_keys[0].columns, vec!["customer_id"]);
    assert_eq!(orders.foreign_keys[0].referred_table, "customers");
    assert_eq!(orders.foreign_keys[0].referred_columns, vec!["id"]);
}

#[tokio::test]
async fn test_missing_table_is_not_found() {
    let (_dir, config) = seeded_database().await;
    let ingestor = connected(&config).await;

    let result = ingestor.get_table_metadata("nope", None).await;
    assert!(matches!(result, Err(DataError::NotFound(_))));
}

#[tokio::test]
async fn test_pages_are_deterministic_and_match_stream() {
    let (_dir, config) = seeded_database().await;
    let ingestor = connected(&config).await;

    let mut paged = Vec::new();
    for offset in (0..8).step_by(3) {
        let page = ingestor
            .extract_data("customers", None, 3, offset)
            .await
            .unwrap();
        paged.extend(page);
    }
    assert_eq!(ids(&paged), vec![1, 2, 3, 4, 5, 6, 7]);

    let again = ingestor.extract_data("customers", None, 3, 3).await.unwrap();
    assert_eq!(ids(&again), vec![4, 5, 6]);

    let streamed: Vec<DataRow> = ingestor
        .extract_data_streaming("customers", None, 3)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(streamed, paged);
}

#[tokio::test]
async fn test_stream_without_primary_key_yields_each_row_once() {
    let (_dir, config) = seeded_database().await;
    let ingestor = connected(&config).await;

    let streamed: Vec<DataRow> = ingestor
        .extract_data_streaming("events", None, 1)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let kinds: Vec<&str> = streamed.iter().filter_map(|r| r["kind"].as_str()).collect();
    assert_eq!(kinds, vec!["a", "a", "b", "c"]);
}

#[tokio::test]
async fn test_extract_values_and_keyless_ordering() {
    let (_dir, config) = seeded_database().await;
    let ingestor = connected(&config).await;

    let orders = ingestor.extract_data("orders", None, 10, 0).await.unwrap();
    assert_eq!(orders[0]["total"], json!(10.5));
    assert_eq!(orders[0]["placed_at"], json!("2024-03-01T10:00:00"));

    let customers = ingestor.extract_data("customers", None, 10, 0).await.unwrap();
    assert_eq!(customers[2]["email"], Value::Null);

    // no primary key: every column participates in the ordering
    let events = ingestor.extract_data("events", None, 10, 0).await.unwrap();
    let kinds: Vec<&str> = events.iter().filter_map(|r| r["kind"].as_str()).collect();
    assert_eq!(kinds, vec!["a", "a", "b", "c"]);
}

#[tokio::test]
async fn test_integrity_report_statistics() {
    let (_dir, config) = seeded_database().await;
    let ingestor = connected(&config).await;

    let report = ingestor
        .validate_data_integrity("orders", None)
        .await
        .unwrap();
    assert!(report.is_clean(), "{:?}", report.errors);
    assert_eq!(report.statistics["total_rows"], json!(3));
    assert_eq!(report.statistics["column_count"], json!(4));

    let missing = ingestor.validate_data_integrity("nope", None).await.unwrap();
    assert_eq!(missing.errors.len(), 1);
}

#[tokio::test]
async fn test_load_batch_counts_row_failures() {
    let (_dir, config) = seeded_database().await;
    let ingestor = connected(&config).await;

    let rows: Vec<DataRow> = vec![
        json!({"id": 100, "name": "loaded", "email": null, "unknown_field": true}),
        json!({"id": 101, "name": null}),
        json!({"id": 102, "name": "second"}),
    ]
    .into_iter()
    .map(|v| v.as_object().unwrap().clone())
    .collect();

    let outcome = ingestor.load_batch("customers", None, &rows).await.unwrap();
    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("Row 1:"));

    let metadata = ingestor.get_table_metadata("customers", None).await.unwrap();
    assert_eq!(metadata.row_count, 9);
}

#[tokio::test]
async fn test_connect_rejects_other_store_types() {
    let (_dir, config) = seeded_database().await;
    let mut ingestor = SqlIngestor::new(StoreType::Postgresql).unwrap();
    assert!(!ingestor.connect(&config).await);
    assert!(!ingestor.test_connection(&config).await);

    let sqlite = SqlIngestor::new(StoreType::Sqlite).unwrap();
    assert!(sqlite.test_connection(&config).await);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (_dir, config) = seeded_database().await;
    let mut ingestor = connected(&config).await;

    ingestor.disconnect().await;
    ingestor.disconnect().await;
    assert!(matches!(
        ingestor.discover_schema().await,
        Err(DataError::NotConnected)
    ));
}
