//! Query result cache
//!
//! [`QueryCache`] owns TTL semantics; the backing [`CacheStore`] only holds entries. The
//! in-memory store serves a single process, `datalink-store` provides a Redis-backed one for
//! deployments with several workers.

use crate::error::Result;
use crate::query::ColumnDescriptor;
use crate::traits::DataRow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<DataRow>,
    pub columns: Vec<ColumnDescriptor>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Live only while `now < expires_at`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Storage backend for cached query results
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store `entry`; `ttl` lets backends with native expiry evict on their own
    async fn put(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Process-local cache store
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: &CacheEntry, _ttl: Duration) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// TTL-aware query result cache over a pluggable store
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl QueryCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    /// `sha256("{query}:{identity}")` as lowercase hex
    pub fn cache_key(query: &str, identity: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        hasher.update(b":");
        hasher.update(identity.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.get_at(key, Utc::now()).await
    }

    /// Lookup evaluated at `now`; expired entries are evicted
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        match self.store.get(key).await? {
            Some(entry) if entry.is_live_at(now) => {
                debug!("Cache hit for key {}", key);
                Ok(Some(entry))
            }
            Some(_) => {
                debug!("Cache entry expired for key {}", key);
                self.store.remove(key).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn set(
        &self,
        key: &str,
        data: Vec<DataRow>,
        columns: Vec<ColumnDescriptor>,
        ttl: Duration,
    ) -> Result<CacheEntry> {
        self.set_at(key, data, columns, ttl, Utc::now()).await
    }

    pub async fn set_at(
        &self,
        key: &str,
        data: Vec<DataRow>,
        columns: Vec<ColumnDescriptor>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry {
            data,
            columns,
            cached_at: now,
            expires_at,
        };
        self.store.put(key, &entry, ttl).await?;
        debug!("Cached {} rows under key {} for {:?}", entry.data.len(), key, ttl);
        Ok(entry)
    }

    pub async fn invalidate(&self, key: &str) -> Result<()> {
        self.store.remove(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}
