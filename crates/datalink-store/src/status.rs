use crate::connection::{namespaced_key, DEFAULT_NAMESPACE};
use crate::error::StoreError;
use async_trait::async_trait;
use datalink_core::{ExecutionStatus, Result, StatusStore};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, warn};

/// [`StatusStore`] that lets every worker see every execution.
///
/// Each snapshot is a JSON string; a set indexes the known execution ids.
#[derive(Clone)]
pub struct RedisStatusStore {
    conn: ConnectionManager,
    namespace: String,
    retention: Option<Duration>,
}

impl RedisStatusStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            namespace: DEFAULT_NAMESPACE.to_string(),
            retention: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Expire snapshots `retention` after their last write
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    fn key(&self, execution_id: &str) -> String {
        namespaced_key(&self.namespace, "execution", execution_id)
    }

    fn index_key(&self) -> String {
        format!("{}:executions", self.namespace)
    }

    fn set_command(&self, key: &str, value: &str, condition: &str) -> redis::Cmd {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(retention) = self.retention {
            cmd.arg("EX").arg(retention.as_secs().max(1));
        }
        cmd.arg(condition);
        cmd
    }

    async fn read(&self, execution_id: &str) -> std::result::Result<Option<ExecutionStatus>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(execution_id)).await?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    async fn insert_status(&self, status: &ExecutionStatus) -> std::result::Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = self.key(&status.execution_id);
        let serialized = serde_json::to_string(status)?;

        let written: Option<String> = self
            .set_command(&key, &serialized, "NX")
            .query_async(&mut conn)
            .await?;
        if written.is_none() {
            return Err(StoreError::DuplicateExecution(status.execution_id.clone()));
        }
        let _: i64 = conn.sadd(self.index_key(), &status.execution_id).await?;
        debug!("Registered execution {}", status.execution_id);
        Ok(())
    }

    async fn update_status(&self, status: &ExecutionStatus) -> std::result::Result<(), StoreError> {
        let existing = self
            .read(&status.execution_id)
            .await?
            .ok_or_else(|| StoreError::ExecutionNotFound(status.execution_id.clone()))?;
        if existing.status.is_terminal() {
            return Err(StoreError::ExecutionFinished {
                execution_id: status.execution_id.clone(),
                status: existing.status.to_string(),
            });
        }

        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(status)?;
        let _: Option<String> = self
            .set_command(&self.key(&status.execution_id), &serialized, "XX")
            .query_async(&mut conn)
            .await?;
        debug!(
            "Updated execution {} ({})",
            status.execution_id, status.status
        );
        Ok(())
    }

    async fn list_statuses(&self) -> std::result::Result<Vec<ExecutionStatus>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.index_key()).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.key(id)).collect();
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(&mut conn).await?;

        let mut statuses = Vec::with_capacity(raw.len());
        for (id, value) in ids.iter().zip(raw) {
            match value {
                Some(value) => statuses.push(serde_json::from_str::<ExecutionStatus>(&value)?),
                None => {
                    // snapshot expired under its retention
                    warn!("Dropping expired execution {} from the index", id);
                    let _: i64 = conn.srem(self.index_key(), id).await?;
                }
            }
        }
        statuses.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(statuses)
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn insert(&self, status: &ExecutionStatus) -> Result<()> {
        Ok(self.insert_status(status).await?)
    }

    async fn update(&self, status: &ExecutionStatus) -> Result<()> {
        Ok(self.update_status(status).await?)
    }

    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionStatus>> {
        Ok(self.read(execution_id).await?)
    }

    async fn list(&self) -> Result<Vec<ExecutionStatus>> {
        Ok(self.list_statuses().await?)
    }
}
