//! OpenAI-compatible chat-completion client.

use crate::config::{ApiConfig, API_KEY_VAR, API_URL_VAR};
use async_trait::async_trait;
use kusari_core::{CallError, ChatClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Sends single-turn chat requests to a configured endpoint with a bearer token.
///
/// The full endpoint URL is used as-is; no path is appended.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
}

// Hand-written so the key never reaches logs.
impl fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("url", &self.url)
            .finish()
    }
}

impl OpenAiCompatClient {
    pub fn new(config: &ApiConfig) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(limit) = config.request_timeout {
            builder = builder.timeout(limit);
        }

        Self {
            http: builder.build().unwrap_or_else(|_| reqwest::Client::new()),
            url: config.url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Builds a client from `KUSARI_API_URL` / `KUSARI_API_KEY`.
    pub fn from_env() -> Self {
        Self::new(&ApiConfig::from_env())
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, CallError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| CallError::NotConfigured(format!("{} is not set", API_URL_VAR)))?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| CallError::NotConfigured(format!("{} is not set", API_KEY_VAR)))?;

        let body = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!("POST {} (model: {})", url, model);

        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CallError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(CallError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_completion(&text)
    }
}

/// Extracts the first choice's message content from a response body.
pub fn parse_completion(body: &str) -> Result<String, CallError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| CallError::MalformedResponse(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            CallError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}
