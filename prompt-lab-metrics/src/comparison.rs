//! Per-task comparisons between strategies: flips against a baseline,
//! agreement patterns and output length versus correctness.

use prompt_lab_core::{LengthClass, Strategy, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::aggregators::MetricAggregator;
use crate::statistical::{StatisticalAnalyzer, StatisticalResult};
use crate::summary::ScoredRun;

type TaskLength = (TaskId, LengthClass);

fn correctness_by_task(scored: &[ScoredRun], strategy: Strategy) -> BTreeMap<TaskLength, bool> {
    scored
        .iter()
        .filter(|r| r.key.strategy == strategy)
        .map(|r| ((r.key.task_id.clone(), r.key.length_class), r.correct))
        .collect()
}

// ===== Flip Analysis =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlipAnalysis {
    pub baseline: Strategy,
    pub candidate: Strategy,
    /// (task, length class) keys attempted by both strategies.
    pub pairs: usize,
    /// Baseline wrong, candidate right.
    pub improved: usize,
    /// Baseline right, candidate wrong.
    pub worsened: usize,
    pub same: usize,
    pub improved_rate: f64,
    pub worsened_rate: f64,
    pub same_rate: f64,
    pub sign_test: StatisticalResult,
}

/// Counts how `candidate` changes correctness relative to `baseline` on every
/// key both attempted. Errored attempts count as incorrect.
pub fn flip_analysis(scored: &[ScoredRun], baseline: Strategy, candidate: Strategy) -> FlipAnalysis {
    let base = correctness_by_task(scored, baseline);
    let cand = correctness_by_task(scored, candidate);

    let (mut improved, mut worsened, mut same) = (0, 0, 0);
    for (key, base_correct) in &base {
        let Some(cand_correct) = cand.get(key) else {
            continue;
        };
        match (base_correct, cand_correct) {
            (false, true) => improved += 1,
            (true, false) => worsened += 1,
            _ => same += 1,
        }
    }

    let pairs = improved + worsened + same;
    let rate = |count: usize| if pairs == 0 { 0.0 } else { count as f64 / pairs as f64 };

    FlipAnalysis {
        baseline,
        candidate,
        pairs,
        improved,
        worsened,
        same,
        improved_rate: rate(improved),
        worsened_rate: rate(worsened),
        same_rate: rate(same),
        sign_test: StatisticalAnalyzer::sign_test(improved, worsened),
    }
}

// ===== Agreement =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgreementType {
    AllCorrect,
    AllWrong,
    SingleWinner,
    MixedMulti,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgreementRow {
    pub task_id: TaskId,
    pub length_class: LengthClass,
    pub attempted: Vec<Strategy>,
    pub correct: Vec<Strategy>,
    pub agreement: AgreementType,
}

/// Which strategies got each (task, length class) right.
pub fn agreement_table(scored: &[ScoredRun]) -> Vec<AgreementRow> {
    let mut by_key: BTreeMap<TaskLength, (Vec<Strategy>, Vec<Strategy>)> = BTreeMap::new();
    for run in scored {
        let entry = by_key
            .entry((run.key.task_id.clone(), run.key.length_class))
            .or_default();
        entry.0.push(run.key.strategy);
        if run.correct {
            entry.1.push(run.key.strategy);
        }
    }

    by_key
        .into_iter()
        .map(|((task_id, length_class), (mut attempted, mut correct))| {
            attempted.sort();
            correct.sort();
            let agreement = match correct.len() {
                0 => AgreementType::AllWrong,
                n if n == attempted.len() => AgreementType::AllCorrect,
                1 => AgreementType::SingleWinner,
                _ => AgreementType::MixedMulti,
            };
            AgreementRow {
                task_id,
                length_class,
                attempted,
                correct,
                agreement,
            }
        })
        .collect()
}

pub fn agreement_counts(rows: &[AgreementRow]) -> BTreeMap<AgreementType, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.agreement).or_insert(0) += 1;
    }
    counts
}

// ===== Output Length =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LengthCorrelation {
    pub strategy: Strategy,
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub mean_words_correct: Option<f64>,
    pub mean_words_incorrect: Option<f64>,
    /// `mean_words_incorrect - mean_words_correct` when both are defined.
    pub difference: Option<f64>,
}

/// Mean output word count for correct versus incorrect answers, per strategy.
/// Errored attempts have no output and are left out.
pub fn length_correlation(scored: &[ScoredRun]) -> Vec<LengthCorrelation> {
    let mut by_strategy: BTreeMap<Strategy, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for run in scored {
        let Some(words) = run.output_words else {
            continue;
        };
        let entry = by_strategy.entry(run.key.strategy).or_default();
        if run.correct {
            entry.0.push(words as f64);
        } else {
            entry.1.push(words as f64);
        }
    }

    by_strategy
        .into_iter()
        .map(|(strategy, (correct, incorrect))| {
            let mean_words_correct = MetricAggregator::mean(&correct);
            let mean_words_incorrect = MetricAggregator::mean(&incorrect);
            LengthCorrelation {
                strategy,
                correct_count: correct.len(),
                incorrect_count: incorrect.len(),
                mean_words_correct,
                mean_words_incorrect,
                difference: mean_words_incorrect
                    .zip(mean_words_correct)
                    .map(|(wrong, right)| wrong - right),
            }
        })
        .collect()
}

// ===== Bundle =====

/// Every per-task comparison computed for one experiment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComparisonReport {
    /// Each non-baseline strategy against baseline; empty without baseline.
    pub flips: Vec<FlipAnalysis>,
    pub agreement: BTreeMap<AgreementType, usize>,
    pub length_correlation: Vec<LengthCorrelation>,
}

impl ComparisonReport {
    pub fn build(scored: &[ScoredRun]) -> Self {
        let strategies: BTreeSet<Strategy> = scored.iter().map(|r| r.key.strategy).collect();
        let flips = if strategies.contains(&Strategy::Baseline) {
            strategies
                .iter()
                .filter(|&&s| s != Strategy::Baseline)
                .map(|&candidate| flip_analysis(scored, Strategy::Baseline, candidate))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            flips,
            agreement: agreement_counts(&agreement_table(scored)),
            length_correlation: length_correlation(scored),
        }
    }
}
