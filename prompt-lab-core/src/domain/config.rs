use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use validator::Validate;

use super::prompt::{FewShotExample, LengthClass, Strategy};
use super::run::QueryOptions;
use crate::error::{CoreError, Result};

// ===== Provider Settings =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Stub,
    Networked,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Stub => "stub",
            ProviderKind::Networked => "networked",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" | "dummy" => Ok(ProviderKind::Stub),
            "networked" | "openai" | "http" => Ok(ProviderKind::Networked),
            other => Err(CoreError::Config(format!("unknown provider: {}", other))),
        }
    }
}

/// How to reach the model. `api_key` never appears in `Debug` output.
#[derive(Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    #[validate(length(min = 1))]
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub model: String,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Permit replacing a networked provider without credentials by the stub.
    pub allow_stub_fallback: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Stub,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            allow_stub_fallback: false,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("allow_stub_fallback", &self.allow_stub_fallback)
            .finish()
    }
}

// ===== Dataset Source =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DatasetSource {
    File { path: PathBuf },
    Synthetic { count: usize, seed: u64 },
    #[default]
    Builtin,
}

// ===== Experiment Configuration =====

/// Fully resolved experiment configuration, passed by value into the
/// pipeline and executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct ExperimentConfig {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub dataset: DatasetSource,
    #[validate(length(min = 1))]
    pub strategies: Vec<Strategy>,
    #[validate(length(min = 1))]
    pub length_classes: Vec<LengthClass>,
    #[validate(nested)]
    pub query: QueryOptions,
    #[validate(nested)]
    pub provider: ProviderSettings,
    #[validate(range(min = 1))]
    pub max_concurrency: usize,
    pub output_dir: PathBuf,
    pub fewshot_examples: Vec<FewShotExample>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "prompt-lab".to_string(),
            dataset: DatasetSource::Builtin,
            strategies: Strategy::ALL.to_vec(),
            length_classes: LengthClass::ALL.to_vec(),
            query: QueryOptions::default(),
            provider: ProviderSettings::default(),
            max_concurrency: 4,
            output_dir: PathBuf::from("results"),
            fewshot_examples: Vec::new(),
        }
    }
}

impl ExperimentConfig {
    /// Checks field constraints and reports them as a configuration error.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(|e| CoreError::Config(e.to_string()))?;

        if let DatasetSource::Synthetic { count: 0, .. } = self.dataset {
            return Err(CoreError::Config(
                "synthetic dataset needs at least one task".to_string(),
            ));
        }
        Ok(())
    }

    /// Strategies deduplicated and in canonical order.
    pub fn canonical_strategies(&self) -> Vec<Strategy> {
        let mut strategies = self.strategies.clone();
        strategies.sort();
        strategies.dedup();
        strategies
    }

    /// Length classes deduplicated and ordered short to long.
    pub fn canonical_length_classes(&self) -> Vec<LengthClass> {
        let mut lengths = self.length_classes.clone();
        lengths.sort();
        lengths.dedup();
        lengths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ExperimentConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = ExperimentConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn empty_strategy_set_is_rejected() {
        let config = ExperimentConfig {
            strategies: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let settings = ProviderSettings {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
