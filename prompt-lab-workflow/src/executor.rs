use futures::stream::{self, StreamExt};
use prompt_lab_core::{
    CoreError, FewShotExample, LengthClass, ModelQueryPort, PromptVariant, QueryOptions, Result,
    ResultSink, RunKey, RunResult, Strategy, Task,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PROGRESS_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub query: QueryOptions,
    pub max_concurrency: usize,
    /// Replaces the built-in few-shot banks when non-empty.
    pub fewshot_examples: Vec<FewShotExample>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            query: QueryOptions::default(),
            max_concurrency: 4,
            fewshot_examples: Vec::new(),
        }
    }
}

/// Emitted once per finished (task, strategy, length class) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionProgress {
    pub completed: usize,
    pub total: usize,
    pub key: RunKey,
    pub failed: bool,
}

/// Runs every (task, strategy, length class) triple against a model query
/// port, appending each result to a sink as soon as it is produced.
///
/// A failed query becomes an error-carrying [`RunResult`] and never aborts
/// the run. A sink failure does abort it, since the log would otherwise
/// silently diverge from the returned results.
pub struct RunExecutor {
    port: Arc<dyn ModelQueryPort>,
    sink: Arc<dyn ResultSink>,
    config: ExecutorConfig,
    progress_tx: broadcast::Sender<ExecutionProgress>,
    cancel: CancellationToken,
}

impl RunExecutor {
    pub fn new(
        port: Arc<dyn ModelQueryPort>,
        sink: Arc<dyn ResultSink>,
        config: ExecutorConfig,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            port,
            sink,
            config,
            progress_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Publishes progress on an existing channel instead of a private one.
    pub fn with_progress_sender(mut self, tx: broadcast::Sender<ExecutionProgress>) -> Self {
        self.progress_tx = tx;
        self
    }

    /// Shares cancellation with an externally owned token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ExecutionProgress> {
        self.progress_tx.subscribe()
    }

    /// Cancelling stops new triples from starting; in-flight queries finish
    /// and are recorded.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes the cross product of `tasks`, `strategies` and
    /// `length_classes`. Strategy and length lists are deduplicated and put
    /// in canonical order first; a repeated task id runs only for its first
    /// occurrence.
    ///
    /// Returns results sorted by task id, strategy, then length class.
    pub async fn execute(
        &self,
        tasks: &[Task],
        strategies: &[Strategy],
        length_classes: &[LengthClass],
    ) -> Result<Vec<RunResult>> {
        let mut seen = HashSet::with_capacity(tasks.len());
        let unique: Vec<&Task> = tasks.iter().filter(|t| seen.insert(&t.id)).collect();
        if unique.len() < tasks.len() {
            warn!(
                skipped = tasks.len() - unique.len(),
                "Repeated task ids ignored"
            );
        }
        let strategies: BTreeSet<Strategy> = strategies.iter().copied().collect();
        let length_classes: BTreeSet<LengthClass> = length_classes.iter().copied().collect();

        let mut triples: Vec<(&Task, PromptVariant)> =
            Vec::with_capacity(unique.len() * strategies.len() * length_classes.len());
        for task in unique.iter().copied() {
            for &strategy in &strategies {
                for &length in &length_classes {
                    triples.push((task, PromptVariant::new(strategy, length)));
                }
            }
        }

        let total = triples.len();
        let concurrency = self.config.max_concurrency.max(1);
        info!(
            tasks = unique.len(),
            strategies = strategies.len(),
            length_classes = length_classes.len(),
            total,
            concurrency,
            port = self.port.name(),
            "Starting run execution"
        );

        let semaphore = Semaphore::new(concurrency);
        let completed = AtomicUsize::new(0);

        let mut outcomes = stream::iter(triples)
            .map(|(task, variant)| self.run_one(task, variant, &semaphore, &completed, total))
            .buffer_unordered(concurrency);

        let mut results = Vec::with_capacity(total);
        while let Some(outcome) = outcomes.next().await {
            if let Some(result) = outcome? {
                results.push(result);
            }
        }

        results.sort_by(|a, b| a.key().cmp(&b.key()));

        let failed = results.iter().filter(|r| r.is_error()).count();
        if self.cancel.is_cancelled() {
            warn!(
                completed = results.len(),
                total, failed, "Run execution cancelled"
            );
        } else {
            info!(completed = results.len(), failed, "Run execution finished");
        }

        Ok(results)
    }

    async fn run_one(
        &self,
        task: &Task,
        variant: PromptVariant,
        semaphore: &Semaphore,
        completed: &AtomicUsize,
        total: usize,
    ) -> Result<Option<RunResult>> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(None),
            permit = semaphore.acquire() => permit.map_err(|_| CoreError::Cancelled)?,
        };

        let key = RunKey::new(task.id.clone(), variant.strategy, variant.length_class);
        let prompt = variant.render_with(task, &self.config.fewshot_examples);

        let result = match self.port.query(&prompt, &self.config.query).await {
            Ok(response) => {
                debug!(%key, latency_ms = response.latency_ms, "Query completed");
                RunResult::success(key, response)
            }
            Err(err) => {
                warn!(
                    task_id = %task.id,
                    strategy = %variant.strategy,
                    length_class = %variant.length_class,
                    kind = %err.kind,
                    error = %err.message,
                    "Query failed"
                );
                RunResult::from_query_error(key, err)
            }
        };

        self.sink.append(&result).await.map_err(|e| {
            error!(key = %result.key(), error = %e, "Failed to record run result");
            match e {
                CoreError::Storage(_) => e,
                other => CoreError::Storage(other.to_string()),
            }
        })?;

        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.progress_tx.send(ExecutionProgress {
            completed: done,
            total,
            key: result.key(),
            failed: result.is_error(),
        });

        Ok(Some(result))
    }
}
