use async_trait::async_trait;
use prompt_lab_core::{
    ModelQueryPort, ProviderSettings, QueryError, QueryErrorKind, QueryOptions, QueryResponse,
    TokenUsage,
};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(8);

// ===== Wire format =====

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// One failed HTTP attempt and whether it may be retried.
struct AttemptFailure {
    error: QueryError,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl AttemptFailure {
    fn fatal(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: QueryError::new(kind, message),
            retryable: false,
            retry_after: None,
        }
    }

    fn transient(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: QueryError::new(kind, message),
            retryable: true,
            retry_after: None,
        }
    }
}

// ===== Provider =====

/// Query port for any OpenAI-compatible `/chat/completions` endpoint.
///
/// Rate limits, timeouts and 5xx responses are retried with exponential
/// backoff up to `max_retries` times. Every other failure is returned at once.
pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl OpenAiCompatibleProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, QueryError> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                QueryError::new(QueryErrorKind::ConfigurationMissing, "no API key configured")
            })?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| QueryError::new(QueryErrorKind::Unknown, e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.api_base.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            max_retries: settings.max_retries,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        })
    }

    /// Overrides the retry backoff window.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(
        &self,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<(String, Option<TokenUsage>), AttemptFailure> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptFailure::transient(QueryErrorKind::Timeout, e.to_string())
                } else {
                    AttemptFailure::fatal(QueryErrorKind::Unknown, e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AttemptFailure {
                retry_after,
                ..AttemptFailure::transient(QueryErrorKind::RateLimited, "rate limited (429)")
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AttemptFailure::fatal(
                QueryErrorKind::AuthFailure,
                format!("authentication rejected ({})", status.as_u16()),
            ));
        }
        if status.is_server_error() {
            return Err(AttemptFailure::transient(
                QueryErrorKind::Unknown,
                format!("server error ({})", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(AttemptFailure::fatal(
                QueryErrorKind::Unknown,
                format!("unexpected status {}", status.as_u16()),
            ));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                AttemptFailure::transient(QueryErrorKind::Timeout, e.to_string())
            } else {
                AttemptFailure::fatal(QueryErrorKind::MalformedResponse, e.to_string())
            }
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AttemptFailure::fatal(
                    QueryErrorKind::MalformedResponse,
                    "response contained no message content",
                )
            })?;

        let usage = parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        Ok((text, usage))
    }
}

#[async_trait]
impl ModelQueryPort for OpenAiCompatibleProvider {
    async fn query(
        &self,
        prompt: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse, QueryError> {
        let started = Instant::now();
        let mut attempts = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match self.send_once(prompt, options).await {
                Ok((text, token_usage)) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    debug!(latency_ms, attempts = attempts + 1, "Query succeeded");
                    return Ok(QueryResponse {
                        text,
                        latency_ms,
                        token_usage,
                    });
                }
                Err(failure) if failure.retryable && attempts < self.max_retries => {
                    attempts += 1;
                    let wait = failure
                        .retry_after
                        .map_or(backoff, |after| after.min(self.max_backoff));
                    warn!(error = %failure.error, "Query attempt failed, will retry");
                    info!(
                        "Retrying query (attempt {}/{}), waiting {:?}",
                        attempts, self.max_retries, wait
                    );
                    tokio::time::sleep(wait).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
                Err(failure) => {
                    return Err(failure
                        .error
                        .with_latency(started.elapsed().as_millis() as u64))
                }
            }
        }
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
