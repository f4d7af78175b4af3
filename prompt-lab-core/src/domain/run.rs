use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use super::prompt::{LengthClass, Strategy};
use super::task::TaskId;
use crate::error::{CoreError, EvaluationError, Result};

// ===== Query Errors =====

/// Classification of a failed model query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    ConfigurationMissing,
    AuthFailure,
    RateLimited,
    Timeout,
    MalformedResponse,
    Unknown,
}

impl QueryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryErrorKind::ConfigurationMissing => "configuration_missing",
            QueryErrorKind::AuthFailure => "auth_failure",
            QueryErrorKind::RateLimited => "rate_limited",
            QueryErrorKind::Timeout => "timeout",
            QueryErrorKind::MalformedResponse => "malformed_response",
            QueryErrorKind::Unknown => "unknown",
        }
    }

    /// Transient failures a provider may retry internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryErrorKind::RateLimited | QueryErrorKind::Timeout)
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// Time the port spent before giving up. Carried to
    /// [`RunResult::latency_ms`] when the failure is recorded; never
    /// serialized with the error itself.
    #[serde(skip)]
    pub latency_ms: u64,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

// ===== Query Options / Response =====

/// Decoding parameters passed to every model query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct QueryOptions {
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f64,
    #[validate(range(min = 1))]
    pub max_output_tokens: u32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub text: String,
    pub latency_ms: u64,
    pub token_usage: Option<TokenUsage>,
}

// ===== Run Key =====

/// Identity of one attempt. Ordering is the canonical result order:
/// task id, then strategy, then length class.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub task_id: TaskId,
    pub strategy: Strategy,
    pub length_class: LengthClass,
}

impl RunKey {
    pub fn new(task_id: TaskId, strategy: Strategy, length_class: LengthClass) -> Self {
        Self {
            task_id,
            strategy,
            length_class,
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.task_id, self.strategy, self.length_class)
    }
}

// ===== Run Result =====

/// Outcome of one `(task, strategy, length_class)` attempt.
///
/// Exactly one of `raw_output` and `error` is set. The constructors guarantee
/// it; records read back from a log are checked with [`RunResult::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub task_id: TaskId,
    pub strategy: Strategy,
    pub length_class: LengthClass,
    #[serde(default)]
    pub raw_output: Option<String>,
    #[serde(default)]
    pub error: Option<QueryError>,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub token_usage: Option<TokenUsage>,
}

impl RunResult {
    pub fn success(key: RunKey, response: QueryResponse) -> Self {
        Self {
            task_id: key.task_id,
            strategy: key.strategy,
            length_class: key.length_class,
            raw_output: Some(response.text),
            error: None,
            latency_ms: response.latency_ms,
            token_usage: response.token_usage,
        }
    }

    /// Records a failed query. The error's own latency is cleared so the
    /// recorded result equals what the log reads back.
    pub fn failure(key: RunKey, mut error: QueryError, latency_ms: u64) -> Self {
        error.latency_ms = 0;
        Self {
            task_id: key.task_id,
            strategy: key.strategy,
            length_class: key.length_class,
            raw_output: None,
            error: Some(error),
            latency_ms,
            token_usage: None,
        }
    }

    pub fn key(&self) -> RunKey {
        RunKey::new(self.task_id.clone(), self.strategy, self.length_class)
    }

    /// Records a port failure using the latency the port reported.
    pub fn from_query_error(key: RunKey, error: QueryError) -> Self {
        let latency_ms = error.latency_ms;
        Self::failure(key, error, latency_ms)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.raw_output, &self.error) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(CoreError::Evaluation(
                EvaluationError::BothOutputAndError(self.key()),
            )),
            (None, None) => Err(CoreError::Evaluation(
                EvaluationError::NeitherOutputNorError(self.key()),
            )),
        }
    }
}
