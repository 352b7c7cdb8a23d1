//! Progress events and the sinks that receive them.

use crate::record::{ExecutionRecord, WorkflowId};
use crate::step::{StepId, StepResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use thiserror::Error;

/// A lifecycle notification for a run. Transient, never persisted.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"STEP_START","stepId":1,"model":"gpt-4o-mini"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    WorkflowStart { workflow_id: WorkflowId },
    #[serde(rename_all = "camelCase")]
    StepStart { step_id: StepId, model: String },
    #[serde(rename_all = "camelCase")]
    StepRetry { step_id: StepId, attempt: u32 },
    #[serde(rename_all = "camelCase")]
    StepComplete { step_id: StepId, result: StepResult },
    WorkflowComplete { execution: ExecutionRecord },
    Error { message: String },
}

impl ProgressEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::WorkflowStart { .. } => "WORKFLOW_START",
            ProgressEvent::StepStart { .. } => "STEP_START",
            ProgressEvent::StepRetry { .. } => "STEP_RETRY",
            ProgressEvent::StepComplete { .. } => "STEP_COMPLETE",
            ProgressEvent::WorkflowComplete { .. } => "WORKFLOW_COMPLETE",
            ProgressEvent::Error { .. } => "ERROR",
        }
    }

    /// Returns `true` for the last event of a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::WorkflowComplete { .. } | ProgressEvent::Error { .. }
        )
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Failure to deliver an event. The engine logs it and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SinkError {
    /// The receiving side has gone away.
    #[error("event sink closed")]
    Closed,
    #[error("event sink failed: {0}")]
    Other(String),
}

/// Receives progress events while a run executes.
///
/// Delivery never influences control flow: errors are logged by the engine and
/// the run proceeds.
///
/// # Examples
///
/// ```
/// use kusari_core::{EventSink, ProgressEvent, SinkError};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct Stdout;
///
/// #[async_trait]
/// impl EventSink for Stdout {
///     async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError> {
///         println!("{}", event.kind());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn emit(&self, _event: ProgressEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the events received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Returns the wire names of the events received so far.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(ProgressEvent::kind).collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError::Other("collector lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

/// Adapts a plain callback into a sink.
///
/// A panicking callback is caught and reported as [`SinkError::Other`], so the
/// run it observes carries on.
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish()
    }
}

#[async_trait]
impl<F> EventSink for FnSink<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    async fn emit(&self, event: ProgressEvent) -> Result<(), SinkError> {
        let kind = event.kind();
        panic::catch_unwind(AssertUnwindSafe(|| (self.0)(event)))
            .map_err(|_| SinkError::Other(format!("callback panicked on {} event", kind)))
    }
}
