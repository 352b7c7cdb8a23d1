//! Workflow error types.

use crate::store::StoreError;
use thiserror::Error;

/// Errors that abort a workflow run.
///
/// A step that exhausts its attempts is not an error: it is recorded as a
/// failed run.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// The persistence collaborator rejected a write.
    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),

    /// The engine was built without a required collaborator.
    #[error("Invalid engine configuration: {0}")]
    Configuration(String),
}
