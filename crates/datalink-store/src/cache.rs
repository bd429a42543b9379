//! Query result cache shared between processes

use crate::connection::{namespaced_key, DEFAULT_NAMESPACE};
use crate::error::StoreError;
use async_trait::async_trait;
use datalink_core::{CacheEntry, CacheStore, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

/// [`CacheStore`] keeping each entry as a JSON string with a native Redis expiry
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
    namespace: String,
}

/// Whole seconds for `EX`, rounded up so an entry never expires early
fn expiry_seconds(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

impl RedisCacheStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_namespace(conn, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(conn: ConnectionManager, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        namespaced_key(&self.namespace, "cache", key)
    }

    async fn read(&self, key: &str) -> std::result::Result<Option<CacheEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let namespaced = self.key(key);
        debug!("Cache GET {}", namespaced);

        let raw: Option<String> = conn.get(&namespaced).await?;
        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    // unreadable entries are treated as misses and dropped
                    warn!("Discarding corrupt cache entry {}: {}", namespaced, e);
                    let _: i64 = conn.del(&namespaced).await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn write(
        &self,
        key: &str,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> std::result::Result<(), StoreError> {
        let seconds = expiry_seconds(ttl);
        if seconds == 0 {
            debug!("Skipping cache write for {} with zero TTL", key);
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let namespaced = self.key(key);
        let serialized = serde_json::to_string(entry)?;
        debug!("Cache SET {} EX {}", namespaced, seconds);

        let _: () = redis::cmd("SET")
            .arg(&namespaced)
            .arg(&serialized)
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> std::result::Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted: usize = conn.del(&keys).await?;
        Ok(deleted)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.read(key).await?)
    }

    async fn put(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        Ok(self.write(key, entry, ttl).await?)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(self.key(key))
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let pattern = self.key("*");
        let deleted = self.delete_matching(&pattern).await?;
        debug!("Cleared {} cache entries", deleted);
        Ok(())
    }
}
