//! Layered experiment configuration.
//!
//! Precedence, lowest first: built-in defaults, `config/default.*`,
//! `config/local.*`, an explicit `--config` file, `PROMPT_LAB_*` environment
//! variables, then command-line flags.

use anyhow::{Context as _, Result};
use clap::Args;
use ::config::builder::DefaultState;
use ::config::{Config as ConfigLoader, ConfigBuilder, File};
use prompt_lab_core::{ExperimentConfig, LengthClass, ProviderKind, Strategy};
use std::path::{Path, PathBuf};

/// Environment variables and the configuration keys they set.
const ENV_KEYS: [(&str, &str); 7] = [
    ("PROMPT_LAB_NAME", "name"),
    ("PROMPT_LAB_PROVIDER", "provider.kind"),
    ("PROMPT_LAB_API_KEY", "provider.api_key"),
    ("PROMPT_LAB_API_BASE", "provider.api_base"),
    ("PROMPT_LAB_MODEL", "provider.model"),
    ("PROMPT_LAB_OUTPUT_DIR", "output_dir"),
    ("PROMPT_LAB_MAX_CONCURRENCY", "max_concurrency"),
];

/// Selects a dataset file; handled separately because it also switches the
/// dataset source kind.
const DATASET_PATH_ENV: &str = "PROMPT_LAB_DATASET_PATH";

/// Flags that override any configured value.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Dataset file (JSON array, or JSON Lines with a .jsonl extension)
    #[arg(short, long, conflicts_with = "synthetic")]
    pub dataset: Option<PathBuf>,

    /// Generate this many synthetic tasks instead of loading a file
    #[arg(long)]
    pub synthetic: Option<usize>,

    /// Seed for synthetic generation
    #[arg(long, default_value = "42", requires = "synthetic")]
    pub seed: u64,

    /// Provider to query: stub or networked
    #[arg(short, long)]
    pub provider: Option<ProviderKind>,

    /// Model name sent to a networked provider
    #[arg(long)]
    pub model: Option<String>,

    /// Strategies to run (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub strategies: Vec<Strategy>,

    /// Length classes to run (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub lengths: Vec<LengthClass>,

    /// Directory for the run log and exported summaries
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of queries in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum output tokens per query
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Use the stub provider when a networked provider has no API key
    #[arg(long)]
    pub allow_stub_fallback: bool,
}

/// Loads configuration from files, the process environment and `overrides`.
pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<ExperimentConfig> {
    load_with_env(config_path, overrides, |key| std::env::var(key).ok())
}

pub fn load_with_env<F>(
    config_path: Option<&Path>,
    overrides: &Overrides,
    env: F,
) -> Result<ExperimentConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ConfigLoader::try_from(&ExperimentConfig::default())
        .context("Failed to encode default configuration")?;

    let mut builder = ConfigLoader::builder()
        .add_source(defaults)
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name("config/local").required(false));

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    }

    for (var, key) in ENV_KEYS {
        builder = builder.set_override_option(key, env(var).filter(|v| !v.is_empty()))?;
    }
    if let Some(path) = env(DATASET_PATH_ENV).filter(|v| !v.is_empty()) {
        builder = dataset_file(builder, path)?;
    }

    builder = apply_overrides(builder, overrides)?;

    let config: ExperimentConfig = builder
        .build()
        .context("Failed to load configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;

    config.validate()?;
    Ok(config)
}

fn dataset_file(
    builder: ConfigBuilder<DefaultState>,
    path: String,
) -> Result<ConfigBuilder<DefaultState>> {
    Ok(builder
        .set_override("dataset.source", "file")?
        .set_override("dataset.path", path)?)
}

fn apply_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    overrides: &Overrides,
) -> Result<ConfigBuilder<DefaultState>> {
    if let Some(path) = &overrides.dataset {
        builder = dataset_file(builder, path.to_string_lossy().into_owned())?;
    }
    if let Some(count) = overrides.synthetic {
        builder = builder
            .set_override("dataset.source", "synthetic")?
            .set_override("dataset.count", count as u64)?
            .set_override("dataset.seed", overrides.seed)?;
    }
    if !overrides.strategies.is_empty() {
        let names: Vec<&str> = overrides.strategies.iter().map(Strategy::as_str).collect();
        builder = builder.set_override("strategies", names)?;
    }
    if !overrides.lengths.is_empty() {
        let names: Vec<&str> = overrides.lengths.iter().map(LengthClass::as_str).collect();
        builder = builder.set_override("length_classes", names)?;
    }
    if overrides.allow_stub_fallback {
        builder = builder.set_override("provider.allow_stub_fallback", true)?;
    }

    Ok(builder
        .set_override_option("provider.kind", overrides.provider.map(|k| k.as_str()))?
        .set_override_option("provider.model", overrides.model.clone())?
        .set_override_option(
            "output_dir",
            overrides
                .output_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )?
        .set_override_option("max_concurrency", overrides.concurrency.map(|n| n as u64))?
        .set_override_option("query.temperature", overrides.temperature)?
        .set_override_option("query.max_output_tokens", overrides.max_tokens.map(u64::from))?)
}
