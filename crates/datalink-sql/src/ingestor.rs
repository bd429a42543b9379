//! Relational ingestor for PostgreSQL, MySQL and SQLite

use crate::catalog::{self, int};
use crate::dialect::Dialect;
use crate::pool::{insert_statement, InsertColumn, SqlPool};
use async_trait::async_trait;
use datalink_core::{
    ConnectionConfig, DataError, DataRow, EngineSettings, Ingestor, IntegrityReport, LoadOutcome,
    Result, RowStream, StoreType, TableMetadata,
};
use tracing::{debug, error, info, warn};

/// Relational [`Ingestor`] over a sqlx pool
pub struct SqlIngestor {
    store_type: StoreType,
    dialect: Dialect,
    settings: EngineSettings,
    pool: Option<SqlPool>,
}

impl SqlIngestor {
    /// Fails with `Unsupported` for store types without a bundled driver
    pub fn new(store_type: StoreType) -> Result<Self> {
        Ok(Self {
            store_type,
            dialect: Dialect::for_store(store_type)?,
            settings: EngineSettings::default(),
            pool: None,
        })
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn pool(&self) -> Result<&SqlPool> {
        self.pool.as_ref().ok_or(DataError::NotConnected)
    }

    /// `SELECT *` with a deterministic ORDER BY: primary key, else every orderable column
    fn select_all(&self, metadata: &TableMetadata) -> String {
        let table_ref = self
            .dialect
            .table_ref(&metadata.name, metadata.schema.as_deref());

        let order: Vec<String> = if metadata.primary_keys.is_empty() {
            metadata
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| self.dialect.is_orderable(&c.data_type))
                .map(|(i, _)| (i + 1).to_string())
                .collect()
        } else {
            metadata
                .primary_keys
                .iter()
                .map(|pk| self.dialect.quote_ident(pk))
                .collect()
        };

        if order.is_empty() {
            format!("SELECT * FROM {}", table_ref)
        } else {
            format!("SELECT * FROM {} ORDER BY {}", table_ref, order.join(", "))
        }
    }

    /// PostgreSQL placeholder cast for a declared type; arrays and user types bind as text
    fn cast_for(&self, data_type: &str) -> Option<String> {
        match self.dialect {
            Dialect::Postgres if !matches!(data_type, "USER-DEFINED" | "ARRAY") => {
                Some(data_type.to_lowercase())
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Ingestor for SqlIngestor {
    fn store_type(&self) -> StoreType {
        self.store_type
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> bool {
        if config.store_type != self.store_type {
            error!(
                "Cannot connect {} ingestor with a {} configuration",
                self.store_type, config.store_type
            );
            return false;
        }

        self.disconnect().await;
        match SqlPool::connect(self.dialect, config, &self.settings).await {
            Ok(pool) => {
                info!("Connected to {}", config.redacted_url());
                self.pool = Some(pool);
                true
            }
            Err(e) => {
                error!("Failed to connect to {}: {}", config.redacted_url(), e);
                false
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Closed {} pool", self.dialect.name());
        }
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> bool {
        if config.store_type != self.store_type {
            return false;
        }
        match SqlPool::connect(self.dialect, config, &self.settings).await {
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

    async fn discover_schema(&self) -> Result<Vec<TableMetadata>> {
        let pool = self.pool()?;
        let tables = catalog::list_tables(pool).await?;
        debug!("Discovered {} tables", tables.len());

        let mut discovered = Vec::with_capacity(tables.len());
        for (schema, table) in tables {
            match catalog::table_metadata(pool, &table, schema.as_deref()).await {
                Ok(metadata) => discovered.push(metadata),
                Err(e) => warn!("Skipping table {}: {}", table, e),
            }
        }
        Ok(discovered)
    }

    async fn get_table_metadata(&self, table: &str, schema: Option<&str>) -> Result<TableMetadata> {
        catalog::table_metadata(self.pool()?, table, schema).await
    }

    async fn extract_data(
        &self,
        table: &str,
        schema: Option<&str>,
        batch_size: usize,
        offset: usize,
    ) -> Result<Vec<DataRow>> {
        let pool = self.pool()?;
        let metadata = catalog::describe_table(pool, table, schema).await?;
        let sql = format!(
            "{} LIMIT {} OFFSET {}",
            self.select_all(&metadata),
            batch_size.max(1),
            offset
        );
        pool.fetch_all(&sql).await
    }

    async fn extract_data_streaming(
        &self,
        table: &str,
        schema: Option<&str>,
        batch_size: usize,
    ) -> Result<RowStream> {
        let pool = self.pool()?;
        let metadata = catalog::describe_table(pool, table, schema).await?;
        // one server-side cursor; rows arrive in the same order the pages use
        debug!(
            "Streaming {} with fetch hint {}",
            metadata.qualified_name(),
            batch_size.max(1)
        );
        Ok(pool.stream(self.select_all(&metadata)))
    }

    async fn validate_data_integrity(
        &self,
        table: &str,
        schema: Option<&str>,
    ) -> Result<IntegrityReport> {
        let pool = self.pool()?;
        let mut report = IntegrityReport::new(table);

        let metadata = match catalog::table_metadata(pool, table, schema).await {
            Ok(metadata) => metadata,
            Err(e) => {
                report.errors.push(format!("Failed to read metadata: {}", e));
                return Ok(report);
            }
        };
        report.stat("total_rows", metadata.row_count);
        report.stat("column_count", metadata.columns.len());

        let table_ref = self.dialect.table_ref(table, metadata.schema.as_deref());

        for column in metadata.columns.iter().filter(|c| !c.nullable) {
            let sql = format!(
                "SELECT COUNT(*) AS null_count FROM {} WHERE {} IS NULL",
                table_ref,
                self.dialect.quote_ident(&column.name)
            );
            match pool.fetch_all(&sql).await {
                Ok(rows) => {
                    let nulls = rows.first().and_then(|r| int(r, "null_count")).unwrap_or(0);
                    if nulls > 0 {
                        report.errors.push(format!(
                            "Column {} has {} null values but is NOT NULL",
                            column.name, nulls
                        ));
                    }
                }
                Err(e) => report
                    .warnings
                    .push(format!("Null check failed for column {}: {}", column.name, e)),
            }
        }

        if !metadata.primary_keys.is_empty() {
            let keys: Vec<String> = metadata
                .primary_keys
                .iter()
                .map(|pk| self.dialect.quote_ident(pk))
                .collect();
            let keys = keys.join(", ");
            let sql = format!(
                "SELECT COUNT(*) AS duplicate_groups FROM \
                 (SELECT {keys} FROM {table_ref} GROUP BY {keys} HAVING COUNT(*) > 1) AS dup"
            );
            match pool.fetch_all(&sql).await {
                Ok(rows) => {
                    let groups = rows
                        .first()
                        .and_then(|r| int(r, "duplicate_groups"))
                        .unwrap_or(0);
                    if groups > 0 {
                        report
                            .errors
                            .push(format!("Found {} duplicate primary key values", groups));
                    }
                }
                Err(e) => report
                    .warnings
                    .push(format!("Primary key check failed: {}", e)),
            }
        }

        Ok(report)
    }

    async fn load_batch(
        &self,
        table: &str,
        schema: Option<&str>,
        rows: &[DataRow],
    ) -> Result<LoadOutcome> {
        let pool = self.pool()?;
        let target = catalog::describe_table(pool, table, schema).await?;
        let table_ref = self.dialect.table_ref(table, target.schema.as_deref());
        let columns: Vec<InsertColumn> = target
            .columns
            .iter()
            .map(|c| InsertColumn {
                name: c.name.clone(),
                cast: self.cast_for(&c.data_type),
            })
            .collect();

        let mut outcome = LoadOutcome::default();
        for (index, row) in rows.iter().enumerate() {
            let Some((sql, values)) = insert_statement(self.dialect, &table_ref, &columns, row)
            else {
                outcome.record_failure(format!("Row {}: no columns match {}", index, table));
                continue;
            };
            match pool.insert_row(&sql, &values).await {
                Ok(_) => outcome.inserted += 1,
                Err(e) if e.is_not_connected() => return Err(e),
                Err(e) => outcome.record_failure(format!("Row {}: {}", index, e)),
            }
        }

        if outcome.failed > 0 {
            warn!(
                "Loaded {} rows into {}, {} failed",
                outcome.inserted, table, outcome.failed
            );
        } else {
            debug!("Loaded {} rows into {}", outcome.inserted, table);
        }
        Ok(outcome)
    }
}
