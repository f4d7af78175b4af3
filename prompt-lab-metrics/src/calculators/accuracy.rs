use async_trait::async_trait;
use prompt_lab_core::{MetricCalculator, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{MetricInput, MetricOutput};
use crate::normalize::{exact_match, lenient_match};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Normalized output equals normalized reference.
    ExactMatch,
    /// Exact match, or the text after a `Final answer:` marker matches.
    FinalAnswer,
}

#[derive(Debug, Clone)]
pub struct AccuracyCalculator {
    pub mode: ComparisonMode,
}

impl AccuracyCalculator {
    pub fn new(mode: ComparisonMode) -> Self {
        Self { mode }
    }

    pub fn is_correct(&self, predicted: &str, reference: &str) -> bool {
        match self.mode {
            ComparisonMode::ExactMatch => exact_match(predicted, reference),
            ComparisonMode::FinalAnswer => lenient_match(predicted, reference),
        }
    }
}

impl Default for AccuracyCalculator {
    fn default() -> Self {
        Self::new(ComparisonMode::ExactMatch)
    }
}

#[async_trait]
impl MetricCalculator for AccuracyCalculator {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let score = match input.reference {
            Some(reference) if self.is_correct(&input.predicted, &reference) => 1.0,
            _ => 0.0,
        };

        Ok(MetricOutput {
            score,
            metadata: json!({
                "metric": "accuracy",
                "comparison_mode": self.mode,
            }),
        })
    }
}
