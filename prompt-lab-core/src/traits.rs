use async_trait::async_trait;

use crate::domain::run::{QueryError, QueryOptions, QueryResponse, RunResult};
use crate::error::Result;

/// Boundary to a language model. Implementations perform exactly one logical
/// query per call; any retrying is their own concern. Latency is reported
/// by the port on both outcomes ([`QueryResponse::latency_ms`],
/// [`QueryError::latency_ms`]).
#[async_trait]
pub trait ModelQueryPort: Send + Sync {
    async fn query(
        &self,
        prompt: &str,
        options: &QueryOptions,
    ) -> std::result::Result<QueryResponse, QueryError>;

    fn name(&self) -> &str;
}

/// Durable destination for run results, appended as they are produced.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn append(&self, result: &RunResult) -> Result<()>;
}

#[async_trait]
pub trait MetricCalculator {
    type Input;
    type Output;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output>;
}
