use async_trait::async_trait;
use prompt_lab_core::{
    ModelQueryPort, QueryError, QueryErrorKind, QueryOptions, QueryResponse, TokenUsage,
};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Labels the default stub picks from.
pub const STUB_LABELS: [&str; 6] = ["positive", "negative", "yes", "no", "12", "unknown"];

type FailurePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

enum Reply {
    Hashed,
    Constant(String),
}

/// Offline, deterministic query port.
///
/// The default reply is a label chosen from [`STUB_LABELS`] by hashing the
/// prompt, so identical prompts always get identical answers. Latency is
/// always reported as zero.
pub struct StubProvider {
    reply: Reply,
    failure: Option<(QueryErrorKind, FailurePredicate)>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            reply: Reply::Hashed,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always replies with `text`.
    pub fn constant(text: impl Into<String>) -> Self {
        Self {
            reply: Reply::Constant(text.into()),
            ..Self::new()
        }
    }

    /// Fails with `kind` for every prompt matching `predicate`.
    pub fn with_failure<F>(mut self, kind: QueryErrorKind, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.failure = Some((kind, Arc::new(predicate)));
        self
    }

    /// Number of queries received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, prompt: &str) -> String {
        match &self.reply {
            Reply::Constant(text) => text.clone(),
            Reply::Hashed => {
                let digest = Sha256::digest(prompt.as_bytes());
                STUB_LABELS[digest[0] as usize % STUB_LABELS.len()].to_string()
            }
        }
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelQueryPort for StubProvider {
    async fn query(
        &self,
        prompt: &str,
        _options: &QueryOptions,
    ) -> Result<QueryResponse, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some((kind, predicate)) = &self.failure {
            if predicate(prompt) {
                return Err(QueryError::new(*kind, "injected stub failure"));
            }
        }

        let text = self.answer(prompt);
        let token_usage = TokenUsage {
            prompt_tokens: prompt.split_whitespace().count() as u32,
            completion_tokens: text.split_whitespace().count() as u32,
        };

        Ok(QueryResponse {
            text,
            latency_ms: 0,
            token_usage: Some(token_usage),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}
