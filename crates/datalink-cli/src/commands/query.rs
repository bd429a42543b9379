use super::{open_stores, pipeline, print_json, ConnectionArgs};
use anyhow::Context;
use clap::Args;
use datalink_core::{EngineSettings, ExecuteOptions, QueryExecutionResult, QueryStatus};
use datalink_query::{QueryEngine, QueryEngineFactory};
use serde_json::json;
use std::time::Duration;

async fn engine_for(connection: &ConnectionArgs, settings: &EngineSettings) -> anyhow::Result<QueryEngine> {
    let stores = open_stores().await?;
    QueryEngineFactory::new(settings.clone())
        .create_query_engine(connection.store, None, stores.cache)
        .context("Failed to create query engine")
}

fn ensure_succeeded(result: &QueryExecutionResult) -> anyhow::Result<()> {
    if result.status == QueryStatus::Failed {
        anyhow::bail!(
            "Query failed: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[derive(Args)]
pub struct QueryCommand {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// SQL text, or a JSON aggregation pipeline for MongoDB
    #[arg(long)]
    query: String,

    /// Skip the result cache for this run
    #[arg(long)]
    no_cache: bool,

    /// Cache lifetime in seconds; defaults to DATALINK_CACHE_TTL_SECS
    #[arg(long)]
    ttl: Option<u64>,
}

impl QueryCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let engine = engine_for(&self.connection, &settings).await?;
        let options = ExecuteOptions {
            use_cache: !self.no_cache,
            ttl: Duration::from_secs(self.ttl.unwrap_or(settings.cache_ttl_secs)),
        };

        let result = engine
            .run(&self.query, &self.connection.to_config(), &json!({}), options)
            .await;
        print_json(&result)?;
        ensure_succeeded(&result)
    }
}

#[derive(Args)]
pub struct ExplainCommand {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    query: String,
}

impl ExplainCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let engine = engine_for(&self.connection, &settings).await?;
        let config = self.connection.to_config();

        let explanation = engine.explain(&self.query).await;
        let plan = engine
            .executor()
            .explain_execution_plan(&self.query, &config)
            .await;
        print_json(&json!({
            "explanation": explanation,
            "plan": plan,
        }))
    }
}

#[derive(Args)]
pub struct GenerateCommand {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Natural-language request, e.g. "how many accounts"
    #[arg(long)]
    prompt: String,

    /// Run the generated query against the store
    #[arg(long)]
    execute: bool,
}

impl GenerateCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let config = self.connection.to_config();
        let stores = open_stores().await?;

        let schema_context = pipeline(&settings, stores.status.clone())
            .extract_schema_summary(&config)
            .await?;
        let engine = QueryEngineFactory::new(settings.clone())
            .create_query_engine(config.store_type, None, stores.cache)
            .context("Failed to create query engine")?;

        let generated = engine.generate(&self.prompt, &schema_context, None).await?;
        if !self.execute {
            return print_json(&generated);
        }

        let result = engine
            .run(&generated.query, &config, &schema_context, ExecuteOptions {
                use_cache: true,
                ttl: Duration::from_secs(settings.cache_ttl_secs),
            })
            .await;
        print_json(&json!({
            "generated": generated,
            "result": result,
        }))?;
        ensure_succeeded(&result)
    }
}
