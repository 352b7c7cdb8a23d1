//! Step definitions and per-step results.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Attempt ceiling used when a step does not set `retryLimit`.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Caller-assigned step identifier.
///
/// Workflow files written by hand tend to use numbers, UI clients tend to use
/// strings, so both are accepted and echoed back in the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepId {
    /// Numeric identifier, e.g. `1`.
    Number(i64),
    /// Textual identifier, e.g. `"summarize"`.
    Text(String),
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepId::Number(n) => write!(f, "{}", n),
            StepId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for StepId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

/// One unit of work: a prompt sent to a model and a pass/fail criterion.
///
/// # Examples
///
/// ```
/// use kusari_core::{Step, StepId};
///
/// let step: Step = serde_json::from_str(
///     r#"{"id": 1, "model": "gpt-4o-mini", "prompt": "Write a haiku"}"#,
/// ).unwrap();
///
/// assert_eq!(step.id, StepId::Number(1));
/// assert_eq!(step.criteria, "");
/// assert_eq!(step.retry_limit, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Identifier, unique within one workflow.
    pub id: StepId,
    /// Backend model the prompt is sent to.
    pub model: String,
    /// Base prompt.
    pub prompt: String,
    /// Empty, a literal substring, or `/pattern/flags`. `null` reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub criteria: String,
    /// Maximum number of attempts for this step.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

impl Step {
    /// Creates a step with no criteria and the default retry limit.
    pub fn new(id: impl Into<StepId>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            prompt: prompt.into(),
            criteria: String::new(),
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    /// Sets the pass/fail criterion.
    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.criteria = criteria.into();
        self
    }

    /// Sets the attempt ceiling.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Attempt ceiling actually used by the engine.
    ///
    /// A limit of zero still runs the step once.
    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.max(1)
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// The final attempt satisfied the criterion.
    Success,
    /// Every attempt failed the criterion.
    Failed,
}

/// Recorded result of one executed step.
///
/// Only the output of the last attempt is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: StepId,
    pub output: String,
    pub status: StepStatus,
    pub criteria_match: bool,
    pub attempts: u32,
}

impl StepResult {
    /// Builds a result from the final attempt.
    pub fn from_attempt(step_id: StepId, output: String, passed: bool, attempts: u32) -> Self {
        Self {
            step_id,
            output,
            status: if passed {
                StepStatus::Success
            } else {
                StepStatus::Failed
            },
            criteria_match: passed,
            attempts,
        }
    }

    /// Returns `true` if the step passed.
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Delay policy applied before each retry attempt.
///
/// The number of attempts comes from [`Step::retry_limit`]; this only decides
/// how long to wait between them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry immediately.
    #[default]
    None,
    /// Fixed delay between attempts.
    Fixed {
        /// Delay before each retry.
        delay: Duration,
    },
    /// Exponential backoff with a ceiling.
    Exponential {
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
        /// Multiplier for each retry.
        multiplier: u32,
    },
}

/// Error returned when [`Backoff`] configuration is invalid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BackoffError(pub &'static str);

impl Backoff {
    /// Creates a fixed backoff.
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Fixed { delay }
    }

    /// Creates an exponential backoff doubling from `initial_delay`, capped at 60s.
    pub fn exponential(initial_delay: Duration) -> Self {
        Backoff::Exponential {
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// Creates an exponential backoff with custom settings.
    pub fn exponential_with(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
    ) -> Result<Self, BackoffError> {
        if multiplier == 0 {
            return Err(BackoffError("multiplier must be greater than 0"));
        }
        if multiplier > 10 {
            return Err(BackoffError("multiplier must be 10 or less to avoid overflow"));
        }
        if max_delay < initial_delay {
            return Err(BackoffError("max_delay must be >= initial_delay"));
        }
        Ok(Backoff::Exponential {
            initial_delay,
            max_delay,
            multiplier,
        })
    }

    /// Delay before the given attempt (1-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt <= 1 {
            return None;
        }
        let retry = attempt - 2;
        match self {
            Backoff::None => None,
            Backoff::Fixed { delay } => Some(*delay),
            Backoff::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let factor = (*multiplier as u64).saturating_pow(retry);
                let delay = (initial_delay.as_millis() as u64).saturating_mul(factor);
                Some(Duration::from_millis(
                    delay.min(max_delay.as_millis() as u64),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_id_shapes() {
        let id: StepId = serde_json::from_str("7").expect("number id");
        assert_eq!(id, StepId::Number(7));
        let id: StepId = serde_json::from_str("\"draft\"").expect("text id");
        assert_eq!(id, StepId::from("draft"));
        assert_eq!(StepId::from(7).to_string(), "7");
    }

    #[test]
    fn test_step_defaults() {
        let step: Step =
            serde_json::from_str(r#"{"id":"a","model":"m","prompt":"p"}"#).expect("valid step");
        assert_eq!(step.criteria, "");
        assert_eq!(step.retry_limit, DEFAULT_RETRY_LIMIT);

        let step: Step = serde_json::from_str(
            r#"{"id":"a","model":"m","prompt":"p","criteria":"ok","retryLimit":5}"#,
        )
        .expect("valid step");
        assert_eq!(step.criteria, "ok");
        assert_eq!(step.retry_limit, 5);
    }

    #[test]
    fn test_null_criteria_reads_as_empty() {
        let step: Step = serde_json::from_str(
            r#"{"id":1,"model":"m","prompt":"p","criteria":null}"#,
        )
        .expect("valid step");
        assert_eq!(step.criteria, "");
    }

    #[test]
    fn test_zero_retry_limit_still_runs_once() {
        let step = Step::new(1, "m", "p").with_retry_limit(0);
        assert_eq!(step.max_attempts(), 1);
    }

    #[test]
    fn test_step_result_wire_shape() {
        let result = StepResult::from_attempt(StepId::Number(1), "hello".into(), true, 1);
        let json = serde_json::to_value(&result).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({
                "stepId": 1,
                "output": "hello",
                "status": "SUCCESS",
                "criteriaMatch": true,
                "attempts": 1
            })
        );
    }

    #[test]
    fn test_backoff_fixed() {
        let backoff = Backoff::fixed(Duration::from_millis(250));
        assert_eq!(backoff.delay_before(1), None);
        assert_eq!(backoff.delay_before(2), Some(Duration::from_millis(250)));
        assert_eq!(backoff.delay_before(3), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_backoff_exponential() {
        let backoff = Backoff::exponential(Duration::from_millis(100));
        assert_eq!(backoff.delay_before(2), Some(Duration::from_millis(100)));
        assert_eq!(backoff.delay_before(3), Some(Duration::from_millis(200)));
        assert_eq!(backoff.delay_before(4), Some(Duration::from_millis(400)));
    }

    #[test]
    fn test_backoff_exponential_capped() {
        let backoff = Backoff::exponential_with(
            Duration::from_millis(100),
            Duration::from_millis(300),
            3,
        )
        .expect("valid backoff");
        assert_eq!(backoff.delay_before(4), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_backoff_validation() {
        let result =
            Backoff::exponential_with(Duration::from_millis(100), Duration::from_secs(10), 0);
        assert!(result.is_err());
        let result =
            Backoff::exponential_with(Duration::from_secs(10), Duration::from_millis(100), 2);
        assert_eq!(
            result.map_err(|e| e.to_string()),
            Err("max_delay must be >= initial_delay".to_string())
        );
    }

    #[test]
    fn test_no_backoff() {
        assert_eq!(Backoff::None.delay_before(2), None);
    }
}
