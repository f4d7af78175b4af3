use async_trait::async_trait;
use prompt_lab_core::{MetricCalculator, Result};
use serde_json::json;
use std::collections::HashSet;

use super::{MetricInput, MetricOutput};
use crate::normalize::normalize;

/// Token-level Jaccard distance between normalized answers.
///
/// `0.0` means identical word sets, `1.0` means no shared words. Two empty
/// strings are at distance `0.0`.
#[derive(Debug, Clone, Default)]
pub struct SemanticDistance;

impl SemanticDistance {
    pub fn new() -> Self {
        Self
    }

    pub fn distance(&self, predicted: &str, reference: &str) -> f64 {
        let pred = normalize(predicted);
        let refer = normalize(reference);
        let pred_words: HashSet<&str> = pred.split_whitespace().collect();
        let ref_words: HashSet<&str> = refer.split_whitespace().collect();

        let union = pred_words.union(&ref_words).count();
        if union == 0 {
            return 0.0;
        }
        let intersection = pred_words.intersection(&ref_words).count();

        1.0 - intersection as f64 / union as f64
    }
}

#[async_trait]
impl MetricCalculator for SemanticDistance {
    type Input = MetricInput;
    type Output = MetricOutput;

    async fn calculate(&self, input: Self::Input) -> Result<Self::Output> {
        let reference = input.reference.unwrap_or_default();
        Ok(MetricOutput {
            score: self.distance(&input.predicted, &reference),
            metadata: json!({
                "metric": "semantic_distance",
                "method": "jaccard",
            }),
        })
    }
}
