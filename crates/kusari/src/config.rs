//! Environment-supplied configuration.
//!
//! Nothing here fails at load time. A missing endpoint or key surfaces later as
//! a failed AI call, and unparseable numbers are logged and ignored.

use std::fmt;
use std::time::Duration;
use tracing::warn;

pub const API_URL_VAR: &str = "KUSARI_API_URL";
pub const API_KEY_VAR: &str = "KUSARI_API_KEY";
pub const REQUEST_TIMEOUT_VAR: &str = "KUSARI_REQUEST_TIMEOUT_SECS";
pub const STEP_PAUSE_VAR: &str = "KUSARI_STEP_PAUSE_MS";
pub const CALL_TIMEOUT_VAR: &str = "KUSARI_CALL_TIMEOUT_SECS";
pub const RETRY_DELAY_VAR: &str = "KUSARI_RETRY_DELAY_MS";

/// Chat-completion endpoint settings.
#[derive(Clone, Default)]
pub struct ApiConfig {
    /// Endpoint URL the request is POSTed to.
    pub url: Option<String>,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Timeout applied by the HTTP client itself.
    pub request_timeout: Option<Duration>,
}

// Hand-written so the key never reaches logs.
impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Loads settings from the process environment and an optional `.env` file.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            url: non_blank(lookup(API_URL_VAR)),
            api_key: non_blank(lookup(API_KEY_VAR)),
            request_timeout: parse_duration(
                REQUEST_TIMEOUT_VAR,
                lookup(REQUEST_TIMEOUT_VAR),
                Duration::from_secs,
            ),
        }
    }
}

/// Engine pacing and hardening settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pause after announcing each step.
    pub step_pause: Option<Duration>,
    /// Limit on a single AI call, enforced by the engine.
    pub call_timeout: Option<Duration>,
    /// Fixed delay before each retry attempt.
    pub retry_delay: Option<Duration>,
}

impl EngineConfig {
    /// Loads settings from the process environment and an optional `.env` file.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            step_pause: parse_duration(
                STEP_PAUSE_VAR,
                lookup(STEP_PAUSE_VAR),
                Duration::from_millis,
            ),
            call_timeout: parse_duration(
                CALL_TIMEOUT_VAR,
                lookup(CALL_TIMEOUT_VAR),
                Duration::from_secs,
            ),
            retry_delay: parse_duration(
                RETRY_DELAY_VAR,
                lookup(RETRY_DELAY_VAR),
                Duration::from_millis,
            ),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_duration(
    name: &str,
    value: Option<String>,
    unit: fn(u64) -> Duration,
) -> Option<Duration> {
    let raw = non_blank(value)?;
    match raw.trim().parse::<u64>() {
        Ok(0) => None,
        Ok(n) => Some(unit(n)),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a non-negative integer", name, raw);
            None
        }
    }
}
