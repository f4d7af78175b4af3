//! End-to-end experiment: load tasks, execute every run, evaluate and export.

use prompt_lab_core::{ExperimentConfig, ModelQueryPort, Result, RunResult};
use prompt_lab_metrics::{summarize_scored, ComparisonReport, Evaluator, MetricsSummary};
use prompt_lab_storage::{ExportManifest, JsonlResultLog, SummaryExporter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::dataset::TaskStore;
use crate::executor::{ExecutionProgress, ExecutorConfig, RunExecutor};
use crate::provider::resolve_provider;

/// Name of the per-run JSON Lines log inside the output directory.
pub const RUN_LOG_FILE: &str = "runs.jsonl";

const PROGRESS_CHANNEL_CAPACITY: usize = 1024;

/// Metrics plus comparisons for one set of results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub summary: MetricsSummary,
    pub comparisons: ComparisonReport,
}

/// Scores `results` against the tasks they were run on.
pub fn evaluate(tasks: &TaskStore, results: &[RunResult]) -> Result<Evaluation> {
    let scored = Evaluator::from_tasks(tasks).score(results)?;
    Ok(Evaluation {
        summary: summarize_scored(&scored),
        comparisons: ComparisonReport::build(&scored),
    })
}

/// Re-evaluates a previously written run log.
pub async fn evaluate_log(log_path: impl AsRef<Path>, tasks: &TaskStore) -> Result<Evaluation> {
    let results = JsonlResultLog::read_all(log_path.as_ref()).await?;
    info!(
        path = %log_path.as_ref().display(),
        results = results.len(),
        "Evaluating run log"
    );
    evaluate(tasks, &results)
}

#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub experiment_id: Uuid,
    pub run_log: PathBuf,
    pub results: Vec<RunResult>,
    pub evaluation: Evaluation,
    pub manifest: ExportManifest,
}

pub struct ExperimentPipeline {
    config: ExperimentConfig,
    port: Option<Arc<dyn ModelQueryPort>>,
    progress_tx: broadcast::Sender<ExecutionProgress>,
    cancel: CancellationToken,
}

impl ExperimentPipeline {
    pub fn new(config: ExperimentConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            config,
            port: None,
            progress_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `port` instead of resolving one from the provider settings.
    pub fn with_port(mut self, port: Arc<dyn ModelQueryPort>) -> Self {
        self.port = Some(port);
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ExecutionProgress> {
        self.progress_tx.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<ExperimentReport> {
        self.config.validate()?;

        let experiment_id = Uuid::new_v4();
        info!(%experiment_id, name = %self.config.name, "Starting experiment");

        let tasks = TaskStore::from_source(&self.config.dataset).await?;
        let port = match &self.port {
            Some(port) => Arc::clone(port),
            None => resolve_provider(&self.config.provider)?,
        };

        let run_log = self.config.output_dir.join(RUN_LOG_FILE);
        let sink = Arc::new(JsonlResultLog::create(&run_log).await?);

        let executor = RunExecutor::new(
            port,
            sink,
            ExecutorConfig {
                query: self.config.query,
                max_concurrency: self.config.max_concurrency,
                fewshot_examples: self.config.fewshot_examples.clone(),
            },
        )
        .with_progress_sender(self.progress_tx.clone())
        .with_cancellation(self.cancel.clone());

        let results = executor
            .execute(
                tasks.tasks(),
                &self.config.canonical_strategies(),
                &self.config.canonical_length_classes(),
            )
            .await?;

        let evaluation = evaluate(&tasks, &results)?;
        let manifest = SummaryExporter::new(&self.config.output_dir)
            .export(experiment_id, &evaluation.summary, &evaluation.comparisons)
            .await?;

        info!(
            %experiment_id,
            runs = results.len(),
            accuracy = ?evaluation.summary.totals.accuracy,
            "Experiment complete"
        );

        Ok(ExperimentReport {
            experiment_id,
            run_log,
            results,
            evaluation,
            manifest,
        })
    }
}
