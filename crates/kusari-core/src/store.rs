//! Persistence seam for workflow definitions and execution records.

use crate::record::{ExecutionRecord, RunStatus, WorkflowDefinition, WorkflowEntry, WorkflowId};
use crate::step::{Step, StepResult};
use async_trait::async_trait;
use thiserror::Error;

/// Number of workflows returned by history listings unless told otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Errors raised by a [`WorkflowStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind, e.g. `"workflow"`.
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The backing store rejected the operation.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Stores workflow definitions and their execution records.
///
/// Implementations serialize their own writes; the engine may run several
/// workflows against one store concurrently.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Records a new workflow definition and assigns its id.
    async fn create_workflow(
        &self,
        name: String,
        steps: Vec<Step>,
    ) -> Result<WorkflowDefinition, StoreError>;

    /// Records the outcome of a run.
    async fn create_execution(
        &self,
        workflow_id: WorkflowId,
        status: RunStatus,
        results: Vec<StepResult>,
    ) -> Result<ExecutionRecord, StoreError>;

    /// Looks up one workflow.
    async fn get_workflow(
        &self,
        id: WorkflowId,
        with_executions: bool,
    ) -> Result<Option<WorkflowEntry>, StoreError>;

    /// Lists at most `limit` workflows, newest first.
    async fn list_workflows(
        &self,
        limit: usize,
        with_executions: bool,
    ) -> Result<Vec<WorkflowEntry>, StoreError>;

    /// Deletes a workflow after deleting every execution that belongs to it.
    async fn delete_workflow(&self, id: WorkflowId) -> Result<(), StoreError>;
}
