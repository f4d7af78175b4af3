use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use prompt_lab_storage::SummaryExporter;
use prompt_lab_workflow::{evaluate_log, ExperimentPipeline, TaskStore};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod config;
mod output;

use crate::config::Overrides;

/// Run prompting-strategy experiments and evaluate their results
#[derive(Debug, Parser)]
#[command(name = "prompt-lab", version, about)]
struct Cli {
    /// Experiment configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "PROMPT_LAB_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute every configured run, then evaluate and export the results
    Run(RunArgs),
    /// Re-evaluate an existing run log
    Evaluate(EvaluateArgs),
    /// List the tasks the configured dataset resolves to
    Tasks {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    overrides: Overrides,

    /// Print the evaluation as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Debug, Args)]
struct EvaluateArgs {
    /// Run log written by a previous `run`
    #[arg(long)]
    log: PathBuf,

    #[command(flatten)]
    overrides: Overrides,

    /// Write summary files into the configured output directory
    #[arg(long)]
    export: bool,

    /// Print the evaluation as JSON instead of tables
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "prompt_lab=info,prompt_lab_workflow=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run(args) => run(cli.config, args).await,
        Command::Evaluate(args) => evaluate(cli.config, args).await,
        Command::Tasks { overrides } => {
            let config = config::load(cli.config.as_deref(), &overrides)?;
            let tasks = TaskStore::from_source(&config.dataset).await?;
            output::print_tasks(tasks.tasks());
            Ok(())
        }
    }
}

async fn run(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let config = config::load(config_path.as_deref(), &args.overrides)?;
    info!(
        name = %config.name,
        provider = config.provider.kind.as_str(),
        output_dir = %config.output_dir.display(),
        "Configuration loaded"
    );

    let pipeline = ExperimentPipeline::new(config);

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight queries");
            cancel.cancel();
        }
    });

    let progress = (!args.no_progress && !args.json)
        .then(|| output::spawn_progress_bar(pipeline.subscribe_progress()));

    let report = pipeline.run().await;
    drop(pipeline);
    if let Some(handle) = progress {
        let _ = handle.await;
    }
    let report = report?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.evaluation)?);
    } else {
        output::print_evaluation(&report.evaluation);
        println!(
            "\nExperiment {}: run log {}, {} summary file(s)",
            report.experiment_id,
            report.run_log.display(),
            report.manifest.files.len()
        );
    }
    Ok(())
}

async fn evaluate(config_path: Option<PathBuf>, args: EvaluateArgs) -> Result<()> {
    let config = config::load(config_path.as_deref(), &args.overrides)?;
    let tasks = TaskStore::from_source(&config.dataset).await?;
    let evaluation = evaluate_log(&args.log, &tasks)
        .await
        .with_context(|| format!("Failed to evaluate {}", args.log.display()))?;

    if args.export {
        let manifest = SummaryExporter::new(&config.output_dir)
            .export(Uuid::new_v4(), &evaluation.summary, &evaluation.comparisons)
            .await?;
        info!(files = manifest.files.len(), "Summary exported");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        output::print_evaluation(&evaluation);
    }
    Ok(())
}
