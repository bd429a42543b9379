use crate::engine::QueryEngine;
use crate::fallback::{FallbackMongoGenerator, FallbackSqlGenerator};
use datalink_core::{
    CacheStore, DataError, EngineSettings, QueryCache, QueryExecutor, QueryGenerator, Result,
    StoreFamily, StoreType,
};
use datalink_mongodb::MongoQueryExecutor;
use datalink_sql::SqlQueryExecutor;
use std::sync::Arc;
use tracing::debug;

const SUPPORTED: [StoreType; 4] = [
    StoreType::Postgresql,
    StoreType::Mysql,
    StoreType::Sqlite,
    StoreType::Mongodb,
];

/// Builds executors, fallback generators and complete engines per store type
#[derive(Debug, Clone, Default)]
pub struct QueryEngineFactory {
    settings: EngineSettings,
}

impl QueryEngineFactory {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn supported_store_types() -> &'static [StoreType] {
        &SUPPORTED
    }

    fn ensure_supported(store_type: StoreType) -> Result<()> {
        if SUPPORTED.contains(&store_type) {
            Ok(())
        } else {
            Err(DataError::unsupported(format!(
                "No query engine for store type {}",
                store_type
            )))
        }
    }

    /// Executor over `cache_store`, or a process-local cache when none is given
    pub fn create_executor(
        &self,
        store_type: StoreType,
        cache_store: Option<Arc<dyn CacheStore>>,
    ) -> Result<Arc<dyn QueryExecutor>> {
        Self::ensure_supported(store_type)?;
        let cache = cache_store.map(QueryCache::new).unwrap_or_default();

        let executor: Arc<dyn QueryExecutor> = match store_type.family() {
            StoreFamily::Relational => {
                Arc::new(SqlQueryExecutor::new(cache).with_settings(self.settings.clone()))
            }
            StoreFamily::Document => {
                Arc::new(MongoQueryExecutor::new(cache).with_settings(self.settings.clone()))
            }
        };
        Ok(executor)
    }

    /// The deterministic generator for `store_type`
    pub fn create_generator(&self, store_type: StoreType) -> Result<Arc<dyn QueryGenerator>> {
        Self::ensure_supported(store_type)?;
        let generator: Arc<dyn QueryGenerator> = match store_type.family() {
            StoreFamily::Relational => Arc::new(FallbackSqlGenerator::new(store_type)),
            StoreFamily::Document => Arc::new(FallbackMongoGenerator::new()),
        };
        Ok(generator)
    }

    pub fn create_query_engine(
        &self,
        store_type: StoreType,
        generator: Option<Arc<dyn QueryGenerator>>,
        cache_store: Option<Arc<dyn CacheStore>>,
    ) -> Result<QueryEngine> {
        let executor = self.create_executor(store_type, cache_store)?;
        let fallback = self.create_generator(store_type)?;
        debug!(
            "Created {} query engine (external generator: {})",
            store_type,
            generator.is_some()
        );
        Ok(QueryEngine::new(store_type, generator, fallback, executor))
    }
}
