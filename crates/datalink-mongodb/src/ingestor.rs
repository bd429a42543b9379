//! Document ingestor over the official MongoDB driver

use crate::client::{database_name, open_client};
use crate::convert::{bson_to_json, document_to_row, row_to_document};
use crate::error::query_error;
use crate::inference::{inconsistent_fields, infer_fields, ID_FIELD};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use datalink_core::{
    ConnectionConfig, DataError, DataRow, EngineSettings, IndexInfo, Ingestor, IntegrityReport,
    LoadOutcome, Result, RowStream, StoreType, TableMetadata,
};
use futures::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection, Database};
use tracing::{debug, error, info, warn};

/// [`Ingestor`] for MongoDB collections
#[derive(Default)]
pub struct MongoIngestor {
    settings: EngineSettings,
    client: Option<Client>,
    database: Option<Database>,
}

impl MongoIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    fn database(&self) -> Result<&Database> {
        self.database.as_ref().ok_or(DataError::NotConnected)
    }

    fn collection(&self, name: &str) -> Result<Collection<Document>> {
        Ok(self.database()?.collection::<Document>(name))
    }

    async fn sample(&self, collection: &Collection<Document>, total: u64) -> Result<Vec<Document>> {
        let size = total.min(self.settings.sample_size as u64);
        if size == 0 {
            return Ok(Vec::new());
        }
        collection
            .aggregate([doc! { "$sample": { "size": size as i64 } }])
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)
    }

    async fn indexes(&self, collection: &Collection<Document>) -> Result<Vec<IndexInfo>> {
        let models: Vec<_> = collection
            .list_indexes()
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        Ok(models
            .into_iter()
            .filter_map(|model| {
                let options = model.options.unwrap_or_default();
                let name = options.name.unwrap_or_default();
                if name == "_id_" {
                    return None;
                }
                // special index types carry their kind as the key value, e.g. "text"
                let kind = model.keys.values().find_map(|v| match v {
                    Bson::String(kind) => Some(kind.clone()),
                    _ => None,
                });
                Some(IndexInfo {
                    name,
                    columns: model.keys.keys().cloned().collect(),
                    unique: options.unique.unwrap_or(false),
                    kind,
                })
            })
            .collect())
    }

    async fn count_duplicate_ids(&self, collection: &Collection<Document>) -> Result<i64> {
        let pipeline = [
            doc! { "$group": { "_id": "$_id", "count": { "$sum": 1 } } },
            doc! { "$match": { "count": { "$gt": 1 } } },
            doc! { "$count": "duplicates" },
        ];
        let groups: Vec<Document> = collection
            .aggregate(pipeline)
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;
        Ok(groups
            .first()
            .and_then(|d| d.get("duplicates"))
            .and_then(|v| match v {
                Bson::Int32(n) => Some(*n as i64),
                Bson::Int64(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0))
    }
}

#[async_trait]
impl Ingestor for MongoIngestor {
    fn store_type(&self) -> StoreType {
        StoreType::Mongodb
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> bool {
        if config.store_type != StoreType::Mongodb {
            error!(
                "Cannot connect mongodb ingestor with a {} configuration",
                config.store_type
            );
            return false;
        }

        self.disconnect().await;
        match open_client(config, &self.settings).await {
            Ok(client) => {
                info!("Connected to {}", config.redacted_url());
                self.database = Some(client.database(database_name(config)));
                self.client = Some(client);
                true
            }
            Err(e) => {
                error!("Failed to connect to {}: {}", config.redacted_url(), e);
                false
            }
        }
    }

    async fn disconnect(&mut self) {
        self.database = None;
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            debug!("Closed MongoDB client");
        }
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> bool {
        if config.store_type != StoreType::Mongodb {
            return false;
        }
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

    async fn discover_schema(&self) -> Result<Vec<TableMetadata>> {
        let mut names = self
            .database()?
            .list_collection_names()
            .await
            .map_err(query_error)?;
        names.retain(|name| !name.starts_with("system."));
        names.sort();
        debug!("Discovered {} collections", names.len());

        let mut discovered = Vec::with_capacity(names.len());
        for name in names {
            match self.get_table_metadata(&name, None).await {
                Ok(metadata) => discovered.push(metadata),
                Err(e) => warn!("Skipping collection {}: {}", name, e),
            }
        }
        Ok(discovered)
    }

    async fn get_table_metadata(&self, table: &str, _schema: Option<&str>) -> Result<TableMetadata> {
        let database = self.database()?;
        let names = database
            .list_collection_names()
            .await
            .map_err(query_error)?;
        if !names.iter().any(|name| name == table) {
            return Err(DataError::not_found(format!(
                "Collection '{}' not found in database '{}'",
                table,
                database.name()
            )));
        }

        let collection = self.collection(table)?;
        let total = collection
            .count_documents(doc! {})
            .await
            .map_err(query_error)?;
        let sample = self.sample(&collection, total).await?;

        let mut metadata = TableMetadata::new(table, None);
        metadata.columns = infer_fields(&sample);
        metadata.primary_keys = vec![ID_FIELD.to_string()];
        metadata.indexes = self.indexes(&collection).await?;
        metadata.row_count = total;
        Ok(metadata)
    }

    async fn extract_data(
        &self,
        table: &str,
        _schema: Option<&str>,
        batch_size: usize,
        offset: usize,
    ) -> Result<Vec<DataRow>> {
        let documents: Vec<Document> = self
            .collection(table)?
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .skip(offset as u64)
            .limit(batch_size.max(1) as i64)
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;
        Ok(documents.iter().map(document_to_row).collect())
    }

    async fn extract_data_streaming(
        &self,
        table: &str,
        _schema: Option<&str>,
        batch_size: usize,
    ) -> Result<RowStream> {
        let cursor = self
            .collection(table)?
            .find(doc! {})
            .sort(doc! { "_id": 1 })
            .batch_size(batch_size.max(1) as u32)
            .await
            .map_err(query_error)?;
        Ok(Box::pin(
            cursor
                .map_ok(|doc| document_to_row(&doc))
                .map_err(query_error),
        ))
    }

    async fn validate_data_integrity(
        &self,
        table: &str,
        _schema: Option<&str>,
    ) -> Result<IntegrityReport> {
        let database = self.database()?;
        let collection = self.collection(table)?;
        let mut report = IntegrityReport::new(table);

        let total = match collection.count_documents(doc! {}).await {
            Ok(total) => total,
            Err(e) => {
                report
                    .errors
                    .push(format!("Failed to count documents: {}", query_error(e)));
                return Ok(report);
            }
        };
        report.stat("total_documents", total);
        if total == 0 {
            report.warnings.push("Collection is empty".to_string());
        }

        match self.count_duplicate_ids(&collection).await {
            Ok(0) => {}
            Ok(groups) => report
                .errors
                .push(format!("Found {} duplicate _id values", groups)),
            Err(e) => report.warnings.push(format!("Duplicate _id check failed: {}", e)),
        }

        match collection
            .count_documents(doc! { "_id": { "$exists": false } })
            .await
        {
            Ok(0) => {}
            Ok(missing) => report
                .errors
                .push(format!("Found {} documents without _id", missing)),
            Err(e) => report
                .warnings
                .push(format!("Missing _id check failed: {}", query_error(e))),
        }

        match self.sample(&collection, total).await {
            Ok(sample) => {
                let columns = infer_fields(&sample);
                for (field, types) in inconsistent_fields(&columns) {
                    let observed: Vec<&str> = types.keys().map(String::as_str).collect();
                    report.warnings.push(format!(
                        "Field {} has inconsistent types: {}",
                        field,
                        observed.join(", ")
                    ));
                }
            }
            Err(e) => report.warnings.push(format!("Type consistency check failed: {}", e)),
        }

        match database.run_command(doc! { "collStats": table }).await {
            Ok(stats) => {
                for (key, stat) in [
                    ("size", "size_bytes"),
                    ("storageSize", "storage_size_bytes"),
                    ("nindexes", "index_count"),
                    ("avgObjSize", "avg_document_size_bytes"),
                ] {
                    if let Some(value) = stats.get(key) {
                        report.stat(stat, bson_to_json(value));
                    }
                }
            }
            Err(e) => report
                .warnings
                .push(format!("Collection statistics unavailable: {}", query_error(e))),
        }

        Ok(report)
    }

    async fn load_batch(
        &self,
        table: &str,
        _schema: Option<&str>,
        rows: &[DataRow],
    ) -> Result<LoadOutcome> {
        let collection = self.collection(table)?;
        let mut outcome = LoadOutcome::default();

        let mut documents = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            match row_to_document(row) {
                Ok(doc) => documents.push(doc),
                Err(e) => outcome.record_failure(format!("Row {}: {}", index, e)),
            }
        }
        if documents.is_empty() {
            return Ok(outcome);
        }

        let attempted = documents.len() as u64;
        match collection.insert_many(documents).ordered(false).await {
            Ok(result) => outcome.inserted += result.inserted_ids.len() as u64,
            Err(e) => {
                let write_errors: Option<Vec<(usize, String)>> = match e.kind.as_ref() {
                    ErrorKind::InsertMany(failure) => Some(
                        failure
                            .write_errors
                            .iter()
                            .flatten()
                            .map(|w| (w.index, w.message.clone()))
                            .collect(),
                    ),
                    _ => None,
                };

                match write_errors {
                    Some(write_errors) => {
                        for (index, message) in &write_errors {
                            outcome.record_failure(format!("Row {}: {}", index, message));
                        }
                        outcome.inserted += attempted.saturating_sub(write_errors.len() as u64);
                    }
                    None => {
                        let mapped = query_error(e);
                        if matches!(mapped, DataError::ConnectionFailed(_)) {
                            return Err(mapped);
                        }
                        for _ in 0..attempted {
                            outcome.record_failure(mapped.to_string());
                        }
                    }
                }
            }
        }

        debug!(
            "Loaded {} documents into {}, {} failed",
            outcome.inserted, table, outcome.failed
        );
        Ok(outcome)
    }
}
