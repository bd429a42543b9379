//! Plan and run source-to-target ingestions
//!
//! A run walks the plan's tables in order. Each table is isolated: its failure is recorded and
//! the run moves on, so one bad table yields `completed_with_errors` rather than aborting. The
//! status snapshot is republished to the [`StatusStore`] after every table so other processes
//! can follow progress.

use crate::credentials::{ConnectionRole, CredentialProvider};
use crate::error::{IngestError, Result};
use crate::factory::IngestorFactory;
use chrono::Utc;
use datalink_core::{
    ConnectionConfig, DataError, DataRow, EngineSettings, ExecutionState, ExecutionStatus,
    IngestionPlan, Ingestor, NormalizationRule, RedactedConnectionConfig, StatusStore,
    TableCompletion, TableFailure, TablePlan,
};
use datalink_normalize::Normalizer;
use datalink_query::SchemaContext;
use futures::TryStreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Observer invoked before and after every table
pub type ProgressCallback<'a> = &'a (dyn Fn(&ExecutionStatus) + Send + Sync);

/// Row-level warnings carried into the status per batch
const MAX_BATCH_WARNINGS: usize = 3;

pub struct IngestionPipeline {
    factory: Arc<dyn IngestorFactory>,
    status_store: Arc<dyn StatusStore>,
    normalizer: Normalizer,
    settings: EngineSettings,
}

/// Counters for one table while it streams
#[derive(Default)]
struct TableCounters {
    processed: u64,
    inserted: u64,
    failed: u64,
}

impl IngestionPipeline {
    pub fn new(
        factory: Arc<dyn IngestorFactory>,
        status_store: Arc<dyn StatusStore>,
        normalizer: Normalizer,
        settings: EngineSettings,
    ) -> Self {
        Self {
            factory,
            status_store,
            normalizer,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    async fn connected(&self, config: &ConnectionConfig) -> Result<Box<dyn Ingestor>> {
        let mut ingestor = self.factory.create_ingestor(config.store_type)?;
        if ingestor.connect(config).await {
            Ok(ingestor)
        } else {
            Err(DataError::ConnectionFailed(format!(
                "Failed to connect to {}",
                config.redacted_url()
            ))
            .into())
        }
    }

    /// Discover the source and describe what an ingestion into `target` would do.
    ///
    /// Only the source is contacted; it is disconnected before returning.
    pub async fn create_ingestion_plan(
        &self,
        source: &ConnectionConfig,
        target: &ConnectionConfig,
        table_filters: Option<&[String]>,
    ) -> Result<IngestionPlan> {
        let mut ingestor = self.connected(source).await?;
        let plan = self.build_plan(ingestor.as_ref(), source, target, table_filters).await;
        ingestor.disconnect().await;

        let plan = plan?;
        info!(
            "Created ingestion plan {} with {} tables ({} rows)",
            plan.plan_id,
            plan.tables.len(),
            plan.total_estimated_rows
        );
        Ok(plan)
    }

    async fn build_plan(
        &self,
        ingestor: &dyn Ingestor,
        source: &ConnectionConfig,
        target: &ConnectionConfig,
        table_filters: Option<&[String]>,
    ) -> Result<IngestionPlan> {
        let mut tables = ingestor.discover_schema().await?;

        if let Some(filters) = table_filters {
            tables.retain(|t| filters.contains(&t.name));
            for wanted in filters {
                if !tables.iter().any(|t| &t.name == wanted) {
                    warn!("Table filter {} matched nothing in the source", wanted);
                }
            }
            if tables.is_empty() {
                return Err(IngestError::PlanError(format!(
                    "No source tables match the filter: {}",
                    filters.join(", ")
                )));
            }
        }

        let created_at = Utc::now();
        let normalization_rules = self
            .normalizer
            .analyze_normalization_needs_at(&tables, created_at);
        let rows_per_minute = self.settings.estimated_rows_per_minute.max(1) as f64;

        let table_plans: Vec<TablePlan> = tables
            .iter()
            .map(|t| TablePlan {
                table_name: t.name.clone(),
                schema: t.schema.clone(),
                estimated_rows: t.row_count,
                has_primary_key: !t.primary_keys.is_empty(),
                has_foreign_keys: !t.foreign_keys.is_empty(),
                estimated_duration_minutes: (t.row_count as f64 / rows_per_minute).max(1.0),
            })
            .collect();

        Ok(IngestionPlan {
            plan_id: uuid::Uuid::new_v4().to_string(),
            created_at,
            source_config: RedactedConnectionConfig::from(source),
            target_config: RedactedConnectionConfig::from(target),
            total_estimated_rows: table_plans.iter().map(|t| t.estimated_rows).sum(),
            total_estimated_duration_minutes: table_plans
                .iter()
                .map(|t| t.estimated_duration_minutes)
                .sum(),
            tables: table_plans,
            normalization_rules,
        })
    }

    async fn publish(&self, status: &ExecutionStatus, first: bool) {
        let published = if first {
            self.status_store.insert(status).await
        } else {
            self.status_store.update(status).await
        };
        if let Err(e) = published {
            warn!(
                "Failed to publish status of execution {}: {}",
                status.execution_id, e
            );
        }
    }

    async fn fail(&self, mut status: ExecutionStatus, message: String) -> ExecutionStatus {
        error!("Ingestion {} failed: {}", status.execution_id, message);
        status.errors.push(message);
        status.finish(ExecutionState::Failed);
        self.publish(&status, false).await;
        status
    }

    /// Run `plan`. Always returns a terminal status; fatal problems end in `failed`.
    pub async fn execute_ingestion(
        &self,
        plan: IngestionPlan,
        credentials: &dyn CredentialProvider,
        progress: Option<ProgressCallback<'_>>,
    ) -> ExecutionStatus {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let mut status = ExecutionStatus::start(&execution_id, &plan.plan_id, plan.tables.len());
        self.publish(&status, true).await;
        info!(
            "Starting ingestion {} for plan {} ({} tables)",
            execution_id,
            plan.plan_id,
            plan.tables.len()
        );

        let source_config = credentials.resolve(ConnectionRole::Source, &plan.source_config);
        let target_config = credentials.resolve(ConnectionRole::Target, &plan.target_config);

        let mut source = match self.connected(&source_config).await {
            Ok(ingestor) => ingestor,
            Err(e) => return self.fail(status, format!("Source: {}", e)).await,
        };
        let mut target = match self.connected(&target_config).await {
            Ok(ingestor) => ingestor,
            Err(e) => {
                source.disconnect().await;
                return self.fail(status, format!("Target: {}", e)).await;
            }
        };

        let total = plan.tables.len().max(1) as f64;
        for (index, table) in plan.tables.iter().enumerate() {
            status.current_table = Some(table.table_name.clone());
            status.current_progress_pct = index as f64 / total * 100.0;
            if let Some(progress) = progress {
                progress(&status);
            }

            let rules = plan.rules_for(&table.table_name, table.schema.as_deref());
            let started = Instant::now();
            let mut counters = TableCounters::default();
            let outcome = self
                .ingest_table(
                    source.as_ref(),
                    target.as_ref(),
                    table,
                    &rules,
                    &mut counters,
                    &mut status.warnings,
                )
                .await;

            // batches loaded before a failure are already in the target
            let statistics = &mut status.statistics;
            statistics.total_rows_processed += counters.processed;
            statistics.total_rows_inserted += counters.inserted;
            statistics.total_rows_failed += counters.failed;

            match outcome {
                Ok(()) => {
                    info!(
                        "Table {}: {} rows processed, {} inserted, {} failed",
                        table.table_name, counters.processed, counters.inserted, counters.failed
                    );
                    status.tables_processed += 1;
                    status.statistics.tables_completed.push(TableCompletion {
                        table_name: table.table_name.clone(),
                        rows_processed: counters.processed,
                        rows_inserted: counters.inserted,
                        rows_failed: counters.failed,
                        processing_time_seconds: started.elapsed().as_secs_f64(),
                    });
                }
                Err(e) => {
                    error!(
                        "Table {} failed after {} inserted rows: {}",
                        table.table_name, counters.inserted, e
                    );
                    status
                        .errors
                        .push(format!("Table {}: {}", table.table_name, e));
                    status.statistics.tables_failed.push(TableFailure {
                        table_name: table.table_name.clone(),
                        error: e.to_string(),
                    });
                }
            }

            status.current_progress_pct = (index + 1) as f64 / total * 100.0;
            if let Some(progress) = progress {
                progress(&status);
            }
            self.publish(&status, false).await;
        }

        source.disconnect().await;
        target.disconnect().await;

        let state = if status.statistics.tables_failed.is_empty() {
            ExecutionState::Completed
        } else {
            ExecutionState::CompletedWithErrors
        };
        status.finish(state);
        self.publish(&status, false).await;
        info!(
            "Ingestion {} finished as {} in {:.2}s",
            execution_id, status.status, status.statistics.total_processing_time_seconds
        );
        status
    }

    async fn ingest_table(
        &self,
        source: &dyn Ingestor,
        target: &dyn Ingestor,
        table: &TablePlan,
        rules: &[NormalizationRule],
        counters: &mut TableCounters,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        let name = table.table_name.as_str();
        let schema = table.schema.as_deref();

        let metadata = source.get_table_metadata(name, schema).await?;
        debug!(
            "Ingesting {} ({} rows, {} rules)",
            metadata.qualified_name(),
            metadata.row_count,
            rules.len()
        );

        match source.validate_data_integrity(name, schema).await {
            Ok(report) => warnings.extend(
                report
                    .errors
                    .iter()
                    .chain(report.warnings.iter())
                    .map(|finding| format!("Table {}: {}", name, finding)),
            ),
            Err(e) => warnings.push(format!("Table {}: integrity check failed: {}", name, e)),
        }

        let batch_size = self.settings.batch_size.max(1);
        let mut rows = source.extract_data_streaming(name, schema, batch_size).await?;
        let mut batch: Vec<DataRow> = Vec::with_capacity(batch_size);

        while let Some(row) = rows.try_next().await? {
            batch.push(row);
            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                self.load(target, name, full, rules, counters, warnings).await?;
            }
        }
        if !batch.is_empty() {
            self.load(target, name, batch, rules, counters, warnings).await?;
        }

        Ok(())
    }

    async fn load(
        &self,
        target: &dyn Ingestor,
        table: &str,
        batch: Vec<DataRow>,
        rules: &[NormalizationRule],
        counters: &mut TableCounters,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        counters.processed += batch.len() as u64;
        let normalized = self.normalizer.apply_business_rules(batch, rules)?;
        // the target's own default schema applies; the plan's schema names the source side
        let outcome = target.load_batch(table, None, &normalized).await?;

        counters.inserted += outcome.inserted;
        counters.failed += outcome.failed;
        warnings.extend(
            outcome
                .errors
                .iter()
                .take(MAX_BATCH_WARNINGS)
                .map(|e| format!("Table {}: {}", table, e)),
        );
        Ok(())
    }

    pub async fn get_ingestion_status(&self, execution_id: &str) -> Result<Option<ExecutionStatus>> {
        Ok(self.status_store.get(execution_id).await?)
    }

    pub async fn rollback_ingestion(&self, execution_id: &str) -> Result<bool> {
        Err(IngestError::NotImplemented(format!(
            "rollback of execution {}",
            execution_id
        )))
    }

    /// Generator-ready schema context for the store behind `config`
    pub async fn extract_schema_summary(&self, config: &ConnectionConfig) -> Result<Value> {
        let mut ingestor = self.connected(config).await?;
        let tables = ingestor.discover_schema().await;
        ingestor.disconnect().await;

        let tables = tables?;
        Ok(SchemaContext::from_metadata(config.store_type, &tables).to_value()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use async_trait::async_trait;
    use datalink_core::{
        ColumnMetadata, InMemoryStatusStore, IntegrityReport, LoadOutcome, RowStream, StoreType,
        TableMetadata,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Three in-memory tables; reading `broken` fails, and with `failing_stream` the `gamma`
    /// stream errors after its third row
    struct FakeIngestor {
        store_type: StoreType,
        connectable: bool,
        failing_stream: bool,
        connected: bool,
        loaded: Arc<Mutex<Vec<(String, usize)>>>,
        disconnects: Arc<AtomicUsize>,
    }

    fn rows(table: &str) -> Vec<DataRow> {
        (1..=5)
            .map(|i| {
                json!({"id": i, "name": format!(" {} {} ", table, i)})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect()
    }

    fn metadata(table: &str) -> TableMetadata {
        let mut metadata = TableMetadata::new(table, None);
        metadata.columns = vec![
            ColumnMetadata::new("id", "INTEGER", false),
            ColumnMetadata::new("name", "TEXT", true),
        ];
        metadata.primary_keys = vec!["id".to_string()];
        metadata.row_count = 5;
        metadata
    }

    #[async_trait]
    impl Ingestor for FakeIngestor {
        fn store_type(&self) -> StoreType {
            self.store_type
        }

        async fn connect(&mut self, _config: &ConnectionConfig) -> bool {
            self.connected = self.connectable;
            self.connected
        }

        async fn disconnect(&mut self) {
            self.connected = false;
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        async fn test_connection(&self, _config: &ConnectionConfig) -> bool {
            self.connectable
        }

        async fn discover_schema(&self) -> datalink_core::Result<Vec<TableMetadata>> {
            Ok(["alpha", "broken", "gamma"].into_iter().map(metadata).collect())
        }

        async fn get_table_metadata(
            &self,
            table: &str,
            _schema: Option<&str>,
        ) -> datalink_core::Result<TableMetadata> {
            if table == "broken" {
                return Err(DataError::QueryFailed("relation is corrupt".to_string()));
            }
            Ok(metadata(table))
        }

        async fn extract_data(
            &self,
            table: &str,
            _schema: Option<&str>,
            batch_size: usize,
            offset: usize,
        ) -> datalink_core::Result<Vec<DataRow>> {
            Ok(rows(table).into_iter().skip(offset).take(batch_size).collect())
        }

        async fn extract_data_streaming(
            &self,
            table: &str,
            _schema: Option<&str>,
            _batch_size: usize,
        ) -> datalink_core::Result<RowStream> {
            if self.failing_stream && table == "gamma" {
                let partial = rows(table)
                    .into_iter()
                    .take(3)
                    .map(Ok)
                    .chain(std::iter::once(Err(DataError::QueryFailed(
                        "cursor lost".to_string(),
                    ))));
                return Ok(Box::pin(futures::stream::iter(partial)));
            }
            Ok(Box::pin(futures::stream::iter(rows(table).into_iter().map(Ok))))
        }

        async fn validate_data_integrity(
            &self,
            table: &str,
            _schema: Option<&str>,
        ) -> datalink_core::Result<IntegrityReport> {
            let mut report = IntegrityReport::new(table);
            report.warnings.push("Column name has 0 null values".to_string());
            Ok(report)
        }

        async fn load_batch(
            &self,
            table: &str,
            _schema: Option<&str>,
            rows: &[DataRow],
        ) -> datalink_core::Result<LoadOutcome> {
            self.loaded
                .lock()
                .unwrap()
                .push((table.to_string(), rows.len()));
            Ok(LoadOutcome {
                inserted: rows.len() as u64,
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        unreachable_target: bool,
        failing_stream: bool,
        loaded: Arc<Mutex<Vec<(String, usize)>>>,
        disconnects: Arc<AtomicUsize>,
    }

    impl IngestorFactory for FakeFactory {
        fn create_ingestor(&self, store_type: StoreType) -> datalink_core::Result<Box<dyn Ingestor>> {
            Ok(Box::new(FakeIngestor {
                store_type,
                connectable: !(self.unreachable_target && store_type == StoreType::Mysql),
                failing_stream: self.failing_stream,
                connected: false,
                loaded: self.loaded.clone(),
                disconnects: self.disconnects.clone(),
            }))
        }

        fn supported_store_types(&self) -> Vec<StoreType> {
            vec![StoreType::Postgresql, StoreType::Mysql]
        }
    }

    fn configs() -> (ConnectionConfig, ConnectionConfig) {
        (
            ConnectionConfig::new(StoreType::Postgresql, "app").with_password("secret"),
            ConnectionConfig::new(StoreType::Mysql, "warehouse"),
        )
    }

    fn pipeline(factory: Arc<FakeFactory>, batch_size: usize) -> IngestionPipeline {
        let settings = EngineSettings {
            batch_size,
            estimated_rows_per_minute: 2,
            ..Default::default()
        };
        IngestionPipeline::new(
            factory,
            Arc::new(InMemoryStatusStore::new()),
            Normalizer::new(),
            settings,
        )
    }

    #[tokio::test]
    async fn test_plan_estimates_and_filters() {
        let factory = Arc::new(FakeFactory::default());
        let pipeline = pipeline(factory.clone(), 2);
        let (source, target) = configs();

        let plan = pipeline
            .create_ingestion_plan(&source, &target, None)
            .await
            .unwrap();
        assert_eq!(plan.tables.len(), 3);
        assert_eq!(plan.tables[0].estimated_duration_minutes, 2.5);
        assert_eq!(plan.total_estimated_rows, 15);
        assert_eq!(plan.total_estimated_duration_minutes, 7.5);
        assert!(plan.source_config.has_password);
        assert!(!serde_json::to_string(&plan).unwrap().contains("secret"));
        assert_eq!(factory.disconnects.load(Ordering::SeqCst), 1);

        let filters = vec!["gamma".to_string()];
        let plan = pipeline
            .create_ingestion_plan(&source, &target, Some(&filters))
            .await
            .unwrap();
        assert_eq!(plan.tables.len(), 1);

        let nothing = vec!["missing".to_string()];
        let err = pipeline
            .create_ingestion_plan(&source, &target, Some(&nothing))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::PlanError(_)));
        assert_eq!(factory.disconnects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_table_does_not_stop_the_run() {
        let factory = Arc::new(FakeFactory::default());
        let pipeline = pipeline(factory.clone(), 2);
        let (source, target) = configs();
        let plan = pipeline
            .create_ingestion_plan(&source, &target, None)
            .await
            .unwrap();

        let calls = AtomicUsize::new(0);
        let on_progress = |_: &ExecutionStatus| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let status = pipeline
            .execute_ingestion(
                plan,
                &StaticCredentials::from_configs(&source, &target),
                Some(&on_progress),
            )
            .await;

        assert_eq!(status.status, ExecutionState::CompletedWithErrors);
        assert_eq!(status.tables_processed, 2);
        assert_eq!(status.statistics.tables_failed.len(), 1);
        assert_eq!(status.statistics.tables_failed[0].table_name, "broken");
        assert!(status.errors[0].starts_with("Table broken:"));
        assert_eq!(status.statistics.total_rows_processed, 10);
        assert_eq!(status.statistics.total_rows_inserted, 10);
        assert_eq!(status.current_progress_pct, 100.0);
        assert!(status.end_time.is_some());
        assert!(status.warnings.iter().all(|w| w.starts_with("Table ")));
        assert_eq!(calls.load(Ordering::SeqCst), 6);

        // batches of 2 over 5 rows, for alpha and gamma
        let loaded = factory.loaded.lock().unwrap().clone();
        let alpha: Vec<usize> = loaded
            .iter()
            .filter(|(t, _)| t == "alpha")
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(alpha, vec![2, 2, 1]);
        assert!(!loaded.iter().any(|(t, _)| t == "broken"));

        let stored = pipeline
            .get_ingestion_status(&status.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ExecutionState::CompletedWithErrors);
        assert_eq!(stored.tables_processed, 2);
    }

    #[tokio::test]
    async fn test_stream_error_keeps_rows_already_loaded() {
        let factory = Arc::new(FakeFactory {
            failing_stream: true,
            ..Default::default()
        });
        let pipeline = pipeline(factory.clone(), 2);
        let (source, target) = configs();
        let plan = pipeline
            .create_ingestion_plan(&source, &target, None)
            .await
            .unwrap();

        let status = pipeline
            .execute_ingestion(plan, &StaticCredentials::from_configs(&source, &target), None)
            .await;

        assert_eq!(status.status, ExecutionState::CompletedWithErrors);
        assert_eq!(status.tables_processed, 1);
        let failed: Vec<&str> = status
            .statistics
            .tables_failed
            .iter()
            .map(|f| f.table_name.as_str())
            .collect();
        assert_eq!(failed, vec!["broken", "gamma"]);
        assert!(status.statistics.tables_failed[1].error.contains("cursor lost"));
        assert_eq!(status.statistics.tables_completed[0].table_name, "alpha");

        // one full batch of gamma reached the target before the stream broke
        let loaded = factory.loaded.lock().unwrap().clone();
        let gamma: Vec<usize> = loaded
            .iter()
            .filter(|(t, _)| t == "gamma")
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(gamma, vec![2]);

        let delivered: u64 = loaded.iter().map(|(_, n)| *n as u64).sum();
        assert_eq!(delivered, 7);
        assert_eq!(status.statistics.total_rows_inserted, delivered);
        assert_eq!(status.statistics.total_rows_processed, delivered);
    }

    #[tokio::test]
    async fn test_unreachable_target_fails_the_run() {
        let factory = Arc::new(FakeFactory {
            unreachable_target: true,
            ..Default::default()
        });
        let pipeline = pipeline(factory.clone(), 10);
        let (source, target) = configs();
        let plan = pipeline
            .create_ingestion_plan(&source, &target, None)
            .await
            .unwrap();
        let before = factory.disconnects.load(Ordering::SeqCst);

        let status = pipeline
            .execute_ingestion(plan, &StaticCredentials::default(), None)
            .await;
        assert_eq!(status.status, ExecutionState::Failed);
        assert!(status.errors[0].starts_with("Target:"));
        assert_eq!(status.tables_processed, 0);
        // the source was connected and must be released
        assert_eq!(factory.disconnects.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn test_rollback_is_not_implemented() {
        let pipeline = pipeline(Arc::new(FakeFactory::default()), 10);
        assert!(matches!(
            pipeline.rollback_ingestion("exec").await,
            Err(IngestError::NotImplemented(_))
        ));
        assert!(pipeline.get_ingestion_status("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schema_summary_is_relational_context() {
        let pipeline = pipeline(Arc::new(FakeFactory::default()), 10);
        let (source, _) = configs();
        let summary = pipeline.extract_schema_summary(&source).await.unwrap();
        assert_eq!(summary["database_type"], "postgresql");
        assert_eq!(summary["tables"].as_array().unwrap().len(), 3);
        assert_eq!(summary["tables"][0]["columns"][0]["primary_key"], true);
    }
}
