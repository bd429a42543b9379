//! datalink CLI - discovery, ingestion and querying across relational stores and MongoDB
//!
//! Every command prints pretty JSON on stdout; logs go to stderr.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    DiscoverCommand, ExplainCommand, ExtractCommand, GenerateCommand, IngestCommand, PlanCommand,
    QueryCommand, SchemaContextCommand, StatusCommand, TestConnectionCommand, ValidateCommand,
};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DATALINK_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "DATALINK_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a store with a throwaway connection
    TestConnection(TestConnectionCommand),
    /// List tables or collections with their metadata
    Discover(DiscoverCommand),
    /// Read one page of rows
    Extract(ExtractCommand),
    /// Run integrity checks on a table or collection
    Validate(ValidateCommand),
    /// Print the schema context handed to query generators
    SchemaContext(SchemaContextCommand),
    /// Build an ingestion plan without moving data
    Plan(PlanCommand),
    /// Plan and run an ingestion from source to target
    Ingest(IngestCommand),
    /// Show a recorded ingestion status
    Status(StatusCommand),
    /// Validate and execute a query
    Query(QueryCommand),
    /// Print the engine's execution plan for a query
    Explain(ExplainCommand),
    /// Turn a natural-language request into a query
    Generate(GenerateCommand),
}

fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // RUST_LOG takes full control when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::try_new(format!(
            "datalink={level},sqlx=warn,mongodb=warn,redis=warn",
            level = log_level
        ))?
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match cli.command {
            Commands::TestConnection(cmd) => cmd.execute().await,
            Commands::Discover(cmd) => cmd.execute().await,
            Commands::Extract(cmd) => cmd.execute().await,
            Commands::Validate(cmd) => cmd.execute().await,
            Commands::SchemaContext(cmd) => cmd.execute().await,
            Commands::Plan(cmd) => cmd.execute().await,
            Commands::Ingest(cmd) => cmd.execute().await,
            Commands::Status(cmd) => cmd.execute().await,
            Commands::Query(cmd) => cmd.execute().await,
            Commands::Explain(cmd) => cmd.execute().await,
            Commands::Generate(cmd) => cmd.execute().await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ingest_flags_keep_sides_apart() {
        let cli = Cli::try_parse_from([
            "datalink",
            "plan",
            "--source-store",
            "postgresql",
            "--source-database",
            "crm",
            "--target-store",
            "sqlite",
            "--target-database",
            "/tmp/crm.db",
            "--table",
            "accounts",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Plan(_)));
        assert_eq!(cli.log_level, "info");
    }
}
