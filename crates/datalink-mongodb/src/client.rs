use crate::error::connection_error;
use bson::doc;
use datalink_core::{ConnectionConfig, EngineSettings, Result};
use mongodb::{options::ClientOptions, Client};
use tracing::debug;

const DEFAULT_DATABASE: &str = "admin";

pub(crate) fn database_name(config: &ConnectionConfig) -> &str {
    if config.database.is_empty() {
        DEFAULT_DATABASE
    } else {
        &config.database
    }
}

/// Build a client with pool limits and timeouts from `settings`, verified with `{ping: 1}`
pub(crate) async fn open_client(
    config: &ConnectionConfig,
    settings: &EngineSettings,
) -> Result<Client> {
    let mut options = ClientOptions::parse(config.connection_url())
        .await
        .map_err(connection_error)?;
    options.server_selection_timeout = Some(settings.server_selection_timeout());
    options.connect_timeout = Some(settings.connect_timeout());
    options.max_pool_size = Some(settings.pool_max_connections.max(1));
    options.min_pool_size = Some(settings.pool_min_connections);
    options.max_idle_time = Some(settings.idle_timeout());

    let client = Client::with_options(options).map_err(connection_error)?;
    let ping = client
        .database(database_name(config))
        .run_command(doc! { "ping": 1 })
        .await;
    if let Err(e) = ping {
        client.shutdown().await;
        return Err(connection_error(e));
    }

    debug!("MongoDB client ready for {}", config.redacted_url());
    Ok(client)
}
