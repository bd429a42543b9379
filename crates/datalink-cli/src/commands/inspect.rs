use super::{connected_ingestor, open_stores, pipeline, print_json, ConnectionArgs};
use anyhow::Context;
use clap::Args;
use datalink_core::EngineSettings;
use datalink_ingest::{DefaultIngestorFactory, IngestorFactory};
use serde_json::json;
use tracing::info;

#[derive(Args)]
pub struct TestConnectionCommand {
    #[command(flatten)]
    connection: ConnectionArgs,
}

impl TestConnectionCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let config = self.connection.to_config();
        let ingestor = DefaultIngestorFactory::new(settings).create_ingestor(config.store_type)?;

        let connected = ingestor.test_connection(&config).await;
        print_json(&json!({
            "store_type": config.store_type,
            "url": config.redacted_url(),
            "connected": connected,
        }))?;

        if !connected {
            anyhow::bail!("Connection to {} failed", config.redacted_url());
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct DiscoverCommand {
    #[command(flatten)]
    connection: ConnectionArgs,
}

impl DiscoverCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let config = self.connection.to_config();
        let mut ingestor = connected_ingestor(&settings, &config).await?;

        let tables = ingestor.discover_schema().await;
        ingestor.disconnect().await;
        let tables = tables.context("Schema discovery failed")?;

        info!("Discovered {} entities in {}", tables.len(), config.redacted_url());
        print_json(&tables)
    }
}

#[derive(Args)]
pub struct ExtractCommand {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Table or collection to read
    #[arg(long)]
    table: String,

    #[arg(long)]
    schema: Option<String>,

    /// Rows per page; defaults to DATALINK_BATCH_SIZE
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long, default_value_t = 0)]
    offset: usize,
}

impl ExtractCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let config = self.connection.to_config();
        let batch_size = self.batch_size.unwrap_or(settings.batch_size).max(1);
        let mut ingestor = connected_ingestor(&settings, &config).await?;

        let rows = ingestor
            .extract_data(&self.table, self.schema.as_deref(), batch_size, self.offset)
            .await;
        ingestor.disconnect().await;
        let rows = rows.with_context(|| format!("Failed to read {}", self.table))?;

        print_json(&rows)
    }
}

#[derive(Args)]
pub struct ValidateCommand {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    table: String,

    #[arg(long)]
    schema: Option<String>,
}

impl ValidateCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let config = self.connection.to_config();
        let mut ingestor = connected_ingestor(&settings, &config).await?;

        let report = ingestor
            .validate_data_integrity(&self.table, self.schema.as_deref())
            .await;
        ingestor.disconnect().await;

        print_json(&report?)
    }
}

#[derive(Args)]
pub struct SchemaContextCommand {
    #[command(flatten)]
    connection: ConnectionArgs,
}

impl SchemaContextCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let stores = open_stores().await?;
        let summary = pipeline(&settings, stores.status)
            .extract_schema_summary(&self.connection.to_config())
            .await?;
        print_json(&summary)
    }
}
