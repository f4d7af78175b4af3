use async_trait::async_trait;
use prompt_lab_core::{Result, ResultSink, RunResult};
use tokio::sync::RwLock;

/// Keeps appended results in memory, in arrival order.
#[derive(Default)]
pub struct MemorySink {
    results: RwLock<Vec<RunResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn results(&self) -> Vec<RunResult> {
        self.results.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn append(&self, result: &RunResult) -> Result<()> {
        self.results.write().await.push(result.clone());
        Ok(())
    }
}
