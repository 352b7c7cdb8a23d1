//! Core traits and types for the kusari prompt-chain engine.
//!
//! This crate has no runtime dependencies. It defines what a workflow is and
//! the seams the engine talks to; the engine itself lives in `kusari`.
//!
//! # Core Types
//!
//! - [`Step`] / [`StepResult`] - One prompt in the chain and its recorded outcome
//! - [`WorkflowDefinition`] / [`ExecutionRecord`] - Persisted submissions and runs
//! - [`ProgressEvent`] - Lifecycle notifications emitted during a run
//! - [`WorkflowError`] - Errors that abort a run
//!
//! # Seams
//!
//! - [`ChatClient`] - Sends a prompt to a model
//! - [`EventSink`] - Receives progress events
//! - [`WorkflowStore`] - Persists definitions and execution records
//!
//! # Pure Helpers
//!
//! - [`validate`] - Applies a step's pass/fail criterion
//! - [`extract_context`] - Narrows step output before it feeds the next prompt

mod client;
mod criteria;
mod error;
mod event;
mod extract;
mod record;
mod step;
mod store;

pub use client::{output_or_marker, CallError, ChatClient};
pub use criteria::{validate, Criterion, REGEX_FLAGS};
pub use error::WorkflowError;
pub use event::{CollectingSink, EventSink, FnSink, NoopSink, ProgressEvent, SinkError};
pub use extract::extract_context;
pub use record::{
    workflow_name, ExecutionId, ExecutionRecord, RunStatus, WorkflowDefinition, WorkflowEntry,
    WorkflowId, DEFAULT_WORKFLOW_NAME,
};
pub use step::{
    Backoff, BackoffError, Step, StepId, StepResult, StepStatus, DEFAULT_RETRY_LIMIT,
};
pub use store::{StoreError, WorkflowStore, DEFAULT_HISTORY_LIMIT};
