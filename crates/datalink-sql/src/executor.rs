use crate::dialect::Dialect;
use crate::pool::SqlPool;
use async_trait::async_trait;
use datalink_core::{
    columns_from_first_row, ConnectionConfig, EngineSettings, ExecuteOptions, QueryCache,
    QueryExecutionResult, QueryExecutor, Result, RowStream, StoreFamily,
};
use serde_json::{json, Value};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Executes SQL against one connection identity at a time, caching results
pub struct SqlQueryExecutor {
    cache: QueryCache,
    settings: EngineSettings,
    /// Pool for the most recent connection identity
    pool: Mutex<Option<(String, SqlPool)>>,
}

impl SqlQueryExecutor {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            settings: EngineSettings::default(),
            pool: Mutex::new(None),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Reuse the open pool when the identity matches, otherwise replace it
    async fn pool_for(&self, config: &ConnectionConfig) -> Result<SqlPool> {
        let dialect = Dialect::for_store(config.store_type)?;
        let identity = config.identity();

        let mut guard = self.pool.lock().await;
        if let Some((current, pool)) = guard.as_ref() {
            if *current == identity {
                return Ok(pool.clone());
            }
        }
        if let Some((_, stale)) = guard.take() {
            stale.close().await;
        }

        let pool = SqlPool::connect(dialect, config, &self.settings).await?;
        *guard = Some((identity, pool.clone()));
        Ok(pool)
    }
}

impl Default for SqlQueryExecutor {
    fn default() -> Self {
        Self::new(QueryCache::in_memory())
    }
}

#[async_trait]
impl QueryExecutor for SqlQueryExecutor {
    fn store_family(&self) -> StoreFamily {
        StoreFamily::Relational
    }

    async fn execute_query(
        &self,
        query: &str,
        config: &ConnectionConfig,
        options: ExecuteOptions,
    ) -> QueryExecutionResult {
        let started = Instant::now();
        let key = QueryCache::cache_key(query, &config.identity());

        if options.use_cache {
            match self.cache.get(&key).await {
                Ok(Some(entry)) => {
                    debug!("Serving query from cache");
                    return QueryExecutionResult::cached(
                        query,
                        entry.data,
                        entry.columns,
                        entry.cached_at,
                    );
                }
                Ok(None) => {}
                Err(e) => warn!("Cache lookup failed, executing query: {}", e),
            }
        }

        let outcome = match self.pool_for(config).await {
            Ok(pool) => pool.fetch_all(query).await,
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(rows) => {
                let columns = columns_from_first_row(&rows);
                if options.use_cache {
                    if let Err(e) = self
                        .cache
                        .set(&key, rows.clone(), columns.clone(), options.ttl)
                        .await
                    {
                        warn!("Failed to cache query result: {}", e);
                    }
                }
                debug!("Query returned {} rows in {} ms", rows.len(), elapsed);
                QueryExecutionResult::completed(query, rows, columns, elapsed)
                    .with_metadata("store_type", config.store_type.as_str())
            }
            Err(e) => {
                error!("Query failed on {}: {}", config.redacted_url(), e);
                QueryExecutionResult::failed(query, e.to_string(), elapsed)
            }
        }
    }

    async fn execute_query_streaming(
        &self,
        query: &str,
        config: &ConnectionConfig,
        _batch_size: usize,
    ) -> Result<RowStream> {
        // sqlx fetches from the server cursor incrementally, batch size is advisory here
        let pool = self.pool_for(config).await?;
        Ok(pool.stream(query.to_string()))
    }

    async fn explain_execution_plan(&self, query: &str, config: &ConnectionConfig) -> Value {
        let outcome = match self.pool_for(config).await {
            Ok(pool) => pool
                .fetch_all(&pool.dialect().explain(query))
                .await
                .map(|plan| (pool.dialect(), plan)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((dialect, plan)) => json!({
                "dialect": dialect.name(),
                "execution_plan": plan,
            }),
            Err(e) => {
                warn!("Failed to explain query: {}", e);
                json!({
                    "error": e.to_string(),
                    "execution_plan": [],
                })
            }
        }
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> bool {
        let Ok(dialect) = Dialect::for_store(config.store_type) else {
            return false;
        };
        match SqlPool::connect(dialect, config, &self.settings).await {
            Ok(pool) => {
                pool.close().await;
                true
            }
            Err(e) => {
                warn!("Connection test failed for {}: {}", config.redacted_url(), e);
                false
            }
        }
    }

    async fn close_connection(&self) {
        if let Some((_, pool)) = self.pool.lock().await.take() {
            pool.close().await;
        }
    }
}
