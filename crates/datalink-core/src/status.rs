use crate::error::{DataError, Result};
use crate::plan::ExecutionStatus;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Registry of pipeline execution statuses, readable while a run is in progress
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Register a new execution. Fails if the id is already known.
    async fn insert(&self, status: &ExecutionStatus) -> Result<()>;

    /// Replace the stored snapshot of a running execution
    async fn update(&self, status: &ExecutionStatus) -> Result<()>;

    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionStatus>>;

    async fn list(&self) -> Result<Vec<ExecutionStatus>>;
}

/// Process-local status registry
#[derive(Default)]
pub struct InMemoryStatusStore {
    executions: RwLock<HashMap<String, ExecutionStatus>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn insert(&self, status: &ExecutionStatus) -> Result<()> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&status.execution_id) {
            return Err(DataError::StoreError(format!(
                "Execution {} already registered",
                status.execution_id
            )));
        }
        executions.insert(status.execution_id.clone(), status.clone());
        Ok(())
    }

    async fn update(&self, status: &ExecutionStatus) -> Result<()> {
        let mut executions = self.executions.write().await;
        match executions.get(&status.execution_id) {
            Some(existing) if existing.status.is_terminal() => Err(DataError::StoreError(format!(
                "Execution {} already finished with status {}",
                status.execution_id, existing.status
            ))),
            Some(_) => {
                executions.insert(status.execution_id.clone(), status.clone());
                Ok(())
            }
            None => Err(DataError::not_found(format!(
                "Execution {}",
                status.execution_id
            ))),
        }
    }

    async fn get(&self, execution_id: &str) -> Result<Option<ExecutionStatus>> {
        Ok(self.executions.read().await.get(execution_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ExecutionStatus>> {
        let mut all: Vec<ExecutionStatus> =
            self.executions.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ExecutionState;

    #[tokio::test]
    async fn test_insert_rejects_duplicate_ids() {
        let store = InMemoryStatusStore::new();
        let status = ExecutionStatus::start("exec-1", "plan-1", 1);
        store.insert(&status).await.unwrap();
        assert!(store.insert(&status).await.is_err());
    }

    #[tokio::test]
    async fn test_terminal_status_is_frozen() {
        let store = InMemoryStatusStore::new();
        let mut status = ExecutionStatus::start("exec-1", "plan-1", 1);
        store.insert(&status).await.unwrap();

        status.finish(ExecutionState::Completed);
        store.update(&status).await.unwrap();

        status.tables_processed = 99;
        assert!(store.update(&status).await.is_err());
        let stored = store.get("exec-1").await.unwrap().unwrap();
        assert_eq!(stored.tables_processed, 0);
        assert_eq!(stored.status, ExecutionState::Completed);
    }

    #[tokio::test]
    async fn test_unknown_execution() {
        let store = InMemoryStatusStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        let status = ExecutionStatus::start("missing", "plan", 0);
        assert!(matches!(
            store.update(&status).await,
            Err(DataError::NotFound(_))
        ));
    }
}
