//! Redis store tests against a disposable container.
//!
//! Run with `cargo test -p datalink-store -- --ignored` on a host with Docker.

use chrono::Utc;
use datalink_core::{
    CacheEntry, CacheStore, DataError, ExecutionState, ExecutionStatus, QueryCache, StatusStore,
};
use datalink_store::{connect, RedisCacheStore, RedisStatusStore};
use redis::aio::ConnectionManager;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage,
};

async fn start_redis() -> anyhow::Result<(ContainerAsync<GenericImage>, ConnectionManager)> {
    let container = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(ContainerPort::Tcp(6379))
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await?;
    let port = container.get_host_port_ipv4(6379).await?;
    let conn = connect(&format!("redis://127.0.0.1:{}/", port)).await?;
    Ok((container, conn))
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_cache_round_trip_and_expiry() -> anyhow::Result<()> {
    let (_container, conn) = start_redis().await?;
    let store = Arc::new(RedisCacheStore::with_namespace(conn, "test"));
    let cache = QueryCache::new(store.clone());

    let key = QueryCache::cache_key("SELECT 1", "sqlite:///tmp/a.db");
    let row = json!({"one": 1}).as_object().cloned().unwrap();
    cache
        .set(&key, vec![row.clone()], Vec::new(), Duration::from_secs(60))
        .await?;
    let hit = cache.get(&key).await?.expect("entry should be cached");
    assert_eq!(hit.data, vec![row]);

    cache.invalidate(&key).await?;
    assert!(cache.get(&key).await?.is_none());

    // a zero TTL is never written
    let now = Utc::now();
    let entry = CacheEntry {
        data: Vec::new(),
        columns: Vec::new(),
        cached_at: now,
        expires_at: now,
    };
    store.put("zero", &entry, Duration::ZERO).await?;
    assert!(store.get("zero").await?.is_none());

    store.put("short", &entry, Duration::from_secs(1)).await?;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(store.get("short").await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_status_lifecycle() -> anyhow::Result<()> {
    let (_container, conn) = start_redis().await?;
    let store = RedisStatusStore::new(conn).with_namespace("test");

    let mut status = ExecutionStatus::start("exec-1", "plan-1", 2);
    store.insert(&status).await?;
    assert!(store.insert(&status).await.is_err());

    status.tables_processed = 1;
    store.update(&status).await?;
    assert_eq!(store.get("exec-1").await?.unwrap().tables_processed, 1);

    status.finish(ExecutionState::Completed);
    store.update(&status).await?;
    assert!(store.update(&status).await.is_err());

    let missing = ExecutionStatus::start("exec-2", "plan-1", 1);
    assert!(matches!(
        store.update(&missing).await,
        Err(DataError::NotFound(_))
    ));

    let all = store.list().await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, ExecutionState::Completed);
    Ok(())
}
