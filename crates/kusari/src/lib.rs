//! Chains LLM calls into multi-step runs.
//!
//! Each step's prompt is sent to a model, the answer is checked against the
//! step's criterion, failing answers are retried with an amended prompt, and
//! the narrowed output of a passing step is carried into the next prompt.
//! Progress is reported through an [`EventSink`] while the run executes.
//!
//! # Example
//!
//! ```rust,ignore
//! use kusari::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), WorkflowError> {
//!     let engine = WorkflowEngine::builder()
//!         .client(OpenAiCompatClient::from_env())
//!         .store(InMemoryStore::new())
//!         .build()?;
//!
//!     let steps = vec![
//!         Step::new(1, "gpt-4o-mini", "Write a SQL query listing users").with_criteria("SELECT"),
//!         Step::new(2, "gpt-4o-mini", "Explain this query"),
//!     ];
//!
//!     let sink = CollectingSink::new();
//!     let execution = engine.execute("SQL demo", steps, &sink).await?;
//!     println!("{:?}: {} step(s)", execution.status, execution.results.len());
//!     Ok(())
//! }
//! ```

pub mod config;
mod engine;
mod http;
mod memory;
pub mod stream;

// Re-export core types
pub use kusari_core::*;

pub use config::{ApiConfig, EngineConfig};
pub use engine::{compose_prompt, EngineBuilder, WorkflowEngine, CONTEXT_HEADING};
pub use http::{parse_completion, OpenAiCompatClient};
pub use memory::InMemoryStore;
pub use stream::{
    decode_stream, encode_event, stream_events, stream_run, ChannelSink, NdjsonDecoder,
    NdjsonWriter,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Backoff, ChatClient, CollectingSink, EngineBuilder, EventSink, ExecutionRecord,
        InMemoryStore, NoopSink, OpenAiCompatClient, ProgressEvent, RunStatus, Step, StepId,
        StepResult, StepStatus, WorkflowEngine, WorkflowError, WorkflowStore,
    };
}
