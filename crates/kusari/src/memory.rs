//! In-memory persistence collaborator.

use async_trait::async_trait;
use chrono::Utc;
use kusari_core::{
    ExecutionId, ExecutionRecord, RunStatus, Step, StepResult, StoreError, WorkflowDefinition,
    WorkflowEntry, WorkflowId, WorkflowStore,
};
use tokio::sync::RwLock;
use tracing::debug;

/// Keeps workflows and executions in process memory.
///
/// Writes are serialized by a single lock. Records are kept in creation order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Records>,
}

#[derive(Debug, Default)]
struct Records {
    workflows: Vec<WorkflowDefinition>,
    executions: Vec<ExecutionRecord>,
}

impl Records {
    fn entry(&self, workflow: &WorkflowDefinition, with_executions: bool) -> WorkflowEntry {
        let executions = with_executions.then(|| {
            self.executions
                .iter()
                .filter(|e| e.workflow_id == workflow.id)
                .cloned()
                .collect()
        });
        WorkflowEntry {
            workflow: workflow.clone(),
            executions,
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored execution records, across all workflows.
    pub async fn execution_count(&self) -> usize {
        self.inner.read().await.executions.len()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn create_workflow(
        &self,
        name: String,
        steps: Vec<Step>,
    ) -> Result<WorkflowDefinition, StoreError> {
        let workflow = WorkflowDefinition {
            id: WorkflowId::new(),
            name,
            steps,
            created_at: Utc::now(),
        };
        self.inner.write().await.workflows.push(workflow.clone());
        debug!("Stored workflow {}", workflow.id);
        Ok(workflow)
    }

    async fn create_execution(
        &self,
        workflow_id: WorkflowId,
        status: RunStatus,
        results: Vec<StepResult>,
    ) -> Result<ExecutionRecord, StoreError> {
        let mut records = self.inner.write().await;
        if !records.workflows.iter().any(|w| w.id == workflow_id) {
            return Err(StoreError::NotFound {
                kind: "workflow",
                id: workflow_id.to_string(),
            });
        }

        let execution = ExecutionRecord {
            id: ExecutionId::new(),
            workflow_id,
            status,
            results,
            created_at: Utc::now(),
        };
        records.executions.push(execution.clone());
        debug!("Stored execution {} for workflow {}", execution.id, workflow_id);
        Ok(execution)
    }

    async fn get_workflow(
        &self,
        id: WorkflowId,
        with_executions: bool,
    ) -> Result<Option<WorkflowEntry>, StoreError> {
        let records = self.inner.read().await;
        Ok(records
            .workflows
            .iter()
            .find(|w| w.id == id)
            .map(|w| records.entry(w, with_executions)))
    }

    async fn list_workflows(
        &self,
        limit: usize,
        with_executions: bool,
    ) -> Result<Vec<WorkflowEntry>, StoreError> {
        let records = self.inner.read().await;
        Ok(records
            .workflows
            .iter()
            .rev()
            .take(limit)
            .map(|w| records.entry(w, with_executions))
            .collect())
    }

    async fn delete_workflow(&self, id: WorkflowId) -> Result<(), StoreError> {
        let mut records = self.inner.write().await;
        let position = records
            .workflows
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "workflow",
                id: id.to_string(),
            })?;

        records.executions.retain(|e| e.workflow_id != id);
        records.workflows.remove(position);
        debug!("Deleted workflow {} and its executions", id);
        Ok(())
    }
}
