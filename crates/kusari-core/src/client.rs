//! The chat-completion seam used by the engine.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Why a chat-completion call produced no text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CallError {
    /// Endpoint URL or credentials are missing.
    #[error("{0}")]
    NotConfigured(String),

    /// The request never produced a response.
    #[error("{0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("API Error: {status} {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    MalformedResponse(String),

    /// The call did not finish within the configured limit.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl CallError {
    /// Text substituted for model output when the call fails.
    ///
    /// Criteria run against this text like any other output, so an error
    /// normally fails validation and consumes an attempt.
    pub fn to_marker(&self) -> String {
        format!("[Error calling AI: {}]", self)
    }
}

/// A single-turn chat-completion backend.
///
/// # Examples
///
/// ```
/// use kusari_core::{CallError, ChatClient};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct Echo;
///
/// #[async_trait]
/// impl ChatClient for Echo {
///     async fn complete(&self, _model: &str, prompt: &str) -> Result<String, CallError> {
///         Ok(prompt.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait ChatClient: Send + Sync + Debug {
    /// Sends `prompt` to `model` and returns the generated text.
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, CallError>;

    /// Like [`complete`](Self::complete), but never fails: errors are logged and
    /// returned as [`CallError::to_marker`] text.
    async fn call(&self, model: &str, prompt: &str) -> String {
        output_or_marker(model, self.complete(model, prompt).await)
    }
}

/// Returns the generated text, or logs the failure and returns its marker.
pub fn output_or_marker(model: &str, outcome: Result<String, CallError>) -> String {
    match outcome {
        Ok(text) => text,
        Err(e) => {
            warn!("AI call to model '{}' failed: {}", model, e);
            e.to_marker()
        }
    }
}
