use super::{open_stores, pipeline, print_json, SourceArgs, TargetArgs};
use clap::Args;
use datalink_core::{EngineSettings, ExecutionState, ExecutionStatus};
use datalink_ingest::StaticCredentials;
use tracing::info;

#[derive(Args)]
pub struct PlanCommand {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    target: TargetArgs,

    /// Restrict the plan to these tables; repeatable
    #[arg(long = "table")]
    tables: Vec<String>,
}

impl PlanCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let stores = open_stores().await?;
        let filter = (!self.tables.is_empty()).then_some(self.tables.as_slice());

        let plan = pipeline(&settings, stores.status)
            .create_ingestion_plan(&self.source.to_config(), &self.target.to_config(), filter)
            .await?;
        print_json(&plan)
    }
}

#[derive(Args)]
pub struct IngestCommand {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    target: TargetArgs,

    #[arg(long = "table")]
    tables: Vec<String>,
}

impl IngestCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let settings = EngineSettings::from_env();
        let stores = open_stores().await?;
        let pipeline = pipeline(&settings, stores.status);

        let source = self.source.to_config();
        let target = self.target.to_config();
        let filter = (!self.tables.is_empty()).then_some(self.tables.as_slice());

        let plan = pipeline
            .create_ingestion_plan(&source, &target, filter)
            .await?;
        info!(
            "Plan {}: {} tables, about {:.1} minutes",
            plan.plan_id,
            plan.tables.len(),
            plan.total_estimated_duration_minutes
        );

        let credentials = StaticCredentials::from_configs(&source, &target);
        let progress = |status: &ExecutionStatus| {
            info!(
                "{}/{} tables, {:.0}% ({})",
                status.tables_processed,
                status.total_tables,
                status.current_progress_pct,
                status.current_table.as_deref().unwrap_or("-")
            );
        };
        let status = pipeline
            .execute_ingestion(plan, &credentials, Some(&progress))
            .await;

        print_json(&status)?;
        if status.status == ExecutionState::Failed {
            anyhow::bail!("Ingestion {} failed", status.execution_id);
        }
        Ok(())
    }
}

/// Reads statuses recorded by earlier runs; needs the Redis status store
#[derive(Args)]
pub struct StatusCommand {
    /// Execution to show; lists every recorded execution when omitted
    #[arg(long)]
    execution_id: Option<String>,
}

impl StatusCommand {
    pub async fn execute(self) -> anyhow::Result<()> {
        let stores = open_stores().await?;
        if !stores.shared {
            anyhow::bail!("DATALINK_REDIS_URL must be set to read statuses of other runs");
        }

        match self.execution_id {
            Some(execution_id) => match stores.status.get(&execution_id).await? {
                Some(status) => print_json(&status),
                None => anyhow::bail!("Execution {} not found", execution_id),
            },
            None => print_json(&stores.status.list().await?),
        }
    }
}
