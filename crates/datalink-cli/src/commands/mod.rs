mod ingest;
mod inspect;
mod query;

pub use ingest::{IngestCommand, PlanCommand, StatusCommand};
pub use inspect::{
    DiscoverCommand, ExtractCommand, SchemaContextCommand, TestConnectionCommand, ValidateCommand,
};
pub use query::{ExplainCommand, GenerateCommand, QueryCommand};

use anyhow::Context;
use clap::Args;
use datalink_core::{
    CacheStore, ConnectionConfig, EngineSettings, InMemoryStatusStore, Ingestor, StatusStore,
    StoreType,
};
use datalink_ingest::{DefaultIngestorFactory, IngestionPipeline, IngestorFactory};
use datalink_normalize::Normalizer;
use datalink_store::{RedisCacheStore, RedisStatusStore};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Connection flags for commands that talk to a single store.
///
/// The password is never a flag; it comes from `DATALINK_PASSWORD`.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Store type: postgresql, mysql, sqlite, mongodb
    #[arg(long, env = "DATALINK_STORE")]
    pub store: StoreType,

    /// Database name, or the file path for SQLite
    #[arg(long, env = "DATALINK_DATABASE")]
    pub database: String,

    #[arg(long, env = "DATALINK_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "DATALINK_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "DATALINK_USERNAME")]
    pub username: Option<String>,

    /// Extra connection parameter as key=value; values are parsed as JSON when possible
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,
}

impl ConnectionArgs {
    pub fn to_config(&self) -> ConnectionConfig {
        build_config(
            self.store,
            &self.database,
            self.host.as_deref(),
            self.port,
            self.username.as_deref(),
            &self.params,
            "DATALINK_PASSWORD",
        )
    }
}

/// Source side of a plan or ingestion
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(id = "source_store", long = "source-store", env = "DATALINK_SOURCE_STORE")]
    pub store: StoreType,

    #[arg(id = "source_database", long = "source-database", env = "DATALINK_SOURCE_DATABASE")]
    pub database: String,

    #[arg(id = "source_host", long = "source-host", env = "DATALINK_SOURCE_HOST")]
    pub host: Option<String>,

    #[arg(id = "source_port", long = "source-port", env = "DATALINK_SOURCE_PORT")]
    pub port: Option<u16>,

    #[arg(id = "source_username", long = "source-username", env = "DATALINK_SOURCE_USERNAME")]
    pub username: Option<String>,

    #[arg(id = "source_param", long = "source-param", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,
}

impl SourceArgs {
    pub fn to_config(&self) -> ConnectionConfig {
        build_config(
            self.store,
            &self.database,
            self.host.as_deref(),
            self.port,
            self.username.as_deref(),
            &self.params,
            "DATALINK_SOURCE_PASSWORD",
        )
    }
}

/// Target side of a plan or ingestion
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    #[arg(id = "target_store", long = "target-store", env = "DATALINK_TARGET_STORE")]
    pub store: StoreType,

    #[arg(id = "target_database", long = "target-database", env = "DATALINK_TARGET_DATABASE")]
    pub database: String,

    #[arg(id = "target_host", long = "target-host", env = "DATALINK_TARGET_HOST")]
    pub host: Option<String>,

    #[arg(id = "target_port", long = "target-port", env = "DATALINK_TARGET_PORT")]
    pub port: Option<u16>,

    #[arg(id = "target_username", long = "target-username", env = "DATALINK_TARGET_USERNAME")]
    pub username: Option<String>,

    #[arg(id = "target_param", long = "target-param", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,
}

impl TargetArgs {
    pub fn to_config(&self) -> ConnectionConfig {
        build_config(
            self.store,
            &self.database,
            self.host.as_deref(),
            self.port,
            self.username.as_deref(),
            &self.params,
            "DATALINK_TARGET_PASSWORD",
        )
    }
}

fn build_config(
    store: StoreType,
    database: &str,
    host: Option<&str>,
    port: Option<u16>,
    username: Option<&str>,
    params: &[(String, Value)],
    password_var: &str,
) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(store, database);
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(username) = username {
        config = config.with_username(username);
    }
    if let Ok(password) = std::env::var(password_var) {
        config = config.with_password(password);
    }
    for (key, value) in params {
        config = config.with_param(key.clone(), value.clone());
    }
    config
}

/// `key=value`, with the value read as JSON and kept as a string otherwise
fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Status and cache backends: Redis when `DATALINK_REDIS_URL` is set, process-local otherwise
pub struct Stores {
    pub cache: Option<Arc<dyn CacheStore>>,
    pub status: Arc<dyn StatusStore>,
    pub shared: bool,
}

pub async fn open_stores() -> anyhow::Result<Stores> {
    let Ok(redis_url) = std::env::var("DATALINK_REDIS_URL") else {
        debug!("DATALINK_REDIS_URL not set, using in-process stores");
        return Ok(Stores {
            cache: None,
            status: Arc::new(InMemoryStatusStore::new()),
            shared: false,
        });
    };

    let conn = datalink_store::connect(&redis_url)
        .await
        .context("Failed to connect to Redis")?;
    let mut status = RedisStatusStore::new(conn.clone());
    if let Some(secs) = std::env::var("DATALINK_STATUS_RETENTION_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
    {
        status = status.with_retention(std::time::Duration::from_secs(secs));
    }
    Ok(Stores {
        cache: Some(Arc::new(RedisCacheStore::new(conn))),
        status: Arc::new(status),
        shared: true,
    })
}

pub fn pipeline(settings: &EngineSettings, status: Arc<dyn StatusStore>) -> IngestionPipeline {
    IngestionPipeline::new(
        Arc::new(DefaultIngestorFactory::new(settings.clone())),
        status,
        Normalizer::new(),
        settings.clone(),
    )
}

/// A connected ingestor for `config`; the caller disconnects it
pub async fn connected_ingestor(
    settings: &EngineSettings,
    config: &ConnectionConfig,
) -> anyhow::Result<Box<dyn Ingestor>> {
    let mut ingestor = DefaultIngestorFactory::new(settings.clone())
        .create_ingestor(config.store_type)
        .context("Failed to create ingestor")?;
    if !ingestor.connect(config).await {
        anyhow::bail!("Failed to connect to {}", config.redacted_url());
    }
    Ok(ingestor)
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
