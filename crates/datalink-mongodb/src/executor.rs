use crate::client::{database_name, open_client};
use crate::convert::{document_to_row, parse_pipeline};
use crate::error::query_error;
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use datalink_core::{
    columns_from_first_row, ConnectionConfig, DataError, DataRow, EngineSettings, ExecuteOptions,
    QueryCache, QueryExecutionResult, QueryExecutor, Result, RowStream, StoreFamily,
};
use futures::TryStreamExt;
use mongodb::{Client, Collection};
use serde_json::{json, Value};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Runs aggregation pipelines, given as JSON arrays, against `additional_params.collection`
pub struct MongoQueryExecutor {
    cache: QueryCache,
    settings: EngineSettings,
    client: Mutex<Option<(String, Client)>>,
}

fn required_collection(config: &ConnectionConfig) -> Result<&str> {
    config.collection().ok_or_else(|| {
        DataError::invalid_configuration("MongoDB queries require additional_params.collection")
    })
}

/// Cache identity: the connection plus the collection the pipeline runs on
fn cache_identity(config: &ConnectionConfig, collection: &str) -> String {
    format!("{}:{}", config.identity(), collection)
}

impl MongoQueryExecutor {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            settings: EngineSettings::default(),
            client: Mutex::new(None),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    async fn client_for(&self, config: &ConnectionConfig) -> Result<Client> {
        let identity = config.identity();
        let mut guard = self.client.lock().await;
        if let Some((current, client)) = guard.as_ref() {
            if *current == identity {
                return Ok(client.clone());
            }
        }
        if let Some((_, stale)) = guard.take() {
            stale.shutdown().await;
        }

        let client = open_client(config, &self.settings).await?;
        *guard = Some((identity, client.clone()));
        Ok(client)
    }

    async fn collection_for(
        &self,
        config: &ConnectionConfig,
        name: &str,
    ) -> Result<Collection<Document>> {
        let client = self.client_for(config).await?;
        Ok(client
            .database(database_name(config))
            .collection::<Document>(name))
    }

    async fn run(
        &self,
        config: &ConnectionConfig,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<DataRow>> {
        let documents: Vec<Document> = self
            .collection_for(config, collection)
            .await?
            .aggregate(pipeline)
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;
        Ok(documents.iter().map(document_to_row).collect())
    }
}

impl Default for MongoQueryExecutor {
    fn default() -> Self {
        Self::new(QueryCache::in_memory())
    }
}

#[async_trait]
impl QueryExecutor for MongoQueryExecutor {
    fn store_family(&self) -> StoreFamily {
        StoreFamily::Document
    }

    async fn execute_query(
        &self,
        query: &str,
        config: &ConnectionConfig,
        options: ExecuteOptions,
    ) -> QueryExecutionResult {
        let started = Instant::now();

        // both checks happen before the store is touched
        let prepared = required_collection(config)
            .and_then(|collection| Ok((collection, parse_pipeline(query)?)));
        let (collection, pipeline) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return QueryExecutionResult::failed(query, e.to_string(), 0),
        };

        let key = QueryCache::cache_key(query, &cache_identity(config, collection));
        if options.use_cache {
            match self.cache.get(&key).await {
                Ok(Some(entry)) => {
                    debug!("Serving pipeline from cache");
                    return QueryExecutionResult::cached(
                        query,
                        entry.data,
                        entry.columns,
                        entry.cached_at,
                    );
                }
                Ok(None) => {}
                Err(e) => warn!("Cache lookup failed, executing pipeline: {}", e),
            }
        }

        let outcome = self.run(config, collection, pipeline).await;
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
                        warn!("Failed to cache pipeline result: {}", e);
                    }
                }
                QueryExecutionResult::completed(query, rows, columns, elapsed)
                    .with_metadata("store_type", "mongodb")
                    .with_metadata("collection", collection)
            }
            Err(e) => {
                error!("Pipeline failed on {}: {}", config.redacted_url(), e);
                QueryExecutionResult::failed(query, e.to_string(), elapsed)
            }
        }
    }

    async fn execute_query_streaming(
        &self,
        query: &str,
        config: &ConnectionConfig,
        batch_size: usize,
    ) -> Result<RowStream> {
        let collection = required_collection(config)?;
        let pipeline = parse_pipeline(query)?;
        let cursor = self
            .collection_for(config, collection)
            .await?
            .aggregate(pipeline)
            .batch_size(batch_size.max(1) as u32)
            .await
            .map_err(query_error)?;
        Ok(Box::pin(
            cursor
                .map_ok(|doc| document_to_row(&doc))
                .map_err(query_error),
        ))
    }

    async fn explain_execution_plan(&self, query: &str, config: &ConnectionConfig) -> Value {
        let explained: Result<Document> = async {
            let collection = required_collection(config)?;
            let pipeline = parse_pipeline(query)?;
            let client = self.client_for(config).await?;
            let stages: Vec<Bson> = pipeline.into_iter().map(Bson::Document).collect();
            client
                .database(database_name(config))
                .run_command(doc! {
                    "aggregate": collection,
                    "pipeline": stages,
                    "explain": true,
                })
                .await
                .map_err(query_error)
        }
        .await;

        match explained {
            Ok(plan) => json!({
                "dialect": "mongodb",
                "execution_plan": document_to_row(&plan),
            }),
            Err(e) => {
                warn!("Failed to explain pipeline: {}", e);
                json!({
                    "error": e.to_string(),
                    "execution_plan": [],
                })
            }
        }
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> bool {
        match open_client(config, &self.settings).await {
            Ok(client) => {
                client.shutdown().await;
                true
            }
            Err(e) => {
                warn!("Connection test failed for {}: {}", config.redacted_url(), e);
                false
            }
        }
    }

    async fn close_connection(&self) {
        if let Some((_, client)) = self.client.lock().await.take() {
            client.shutdown().await;
        }
    }
}
