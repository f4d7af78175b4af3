//! Reduction of run results into per-group accuracy, pairwise disagreement
//! and length-sensitivity curves.

use prompt_lab_core::{
    CoreError, EvaluationError, LengthClass, QueryErrorKind, Result, RunKey, RunResult, Strategy,
    Task, TaskId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use crate::aggregators::{AggregatedMetrics, MetricAggregator};
use crate::calculators::{AccuracyCalculator, ComparisonMode, SemanticDistance};
use crate::normalize::{normalize, word_count};
use crate::statistical::StatisticalAnalyzer;

// ===== Scored Runs =====

/// A validated run result paired with its correctness against ground truth.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredRun {
    pub key: RunKey,
    /// Normalized output, `None` for errored attempts.
    pub normalized_output: Option<String>,
    pub correct: bool,
    pub lenient_correct: bool,
    pub error_kind: Option<QueryErrorKind>,
    pub semantic_distance: Option<f64>,
    pub output_words: Option<usize>,
    pub latency_ms: u64,
}

impl ScoredRun {
    pub fn is_error(&self) -> bool {
        self.normalized_output.is_none()
    }
}

// ===== Summary Records =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupMetrics {
    pub strategy: Strategy,
    pub length_class: LengthClass,
    /// Every attempt, errored ones included.
    pub attempts: usize,
    pub exact_matches: usize,
    pub errors: usize,
    /// `exact_matches / attempts`.
    pub accuracy: f64,
    /// `errors / attempts`.
    pub error_rate: f64,
    pub lenient_matches: usize,
    pub lenient_accuracy: f64,
    pub mean_semantic_distance: Option<f64>,
    pub mean_output_words: Option<f64>,
    pub latency_ms: AggregatedMetrics,
    pub error_kinds: BTreeMap<QueryErrorKind, usize>,
}

impl GroupMetrics {
    /// Attempts that produced an output.
    pub fn answered(&self) -> usize {
        self.attempts - self.errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisagreementEntry {
    pub length_class: LengthClass,
    pub strategy_a: Strategy,
    pub strategy_b: Strategy,
    /// Tasks both strategies answered without error.
    pub shared: usize,
    pub differing: usize,
    /// `differing / shared`, `None` when nothing is shared.
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensitivityPoint {
    pub length_class: LengthClass,
    pub accuracy: Option<f64>,
}

/// Accuracy of one strategy across length classes, always in
/// short, medium, long order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensitivityCurve {
    pub strategy: Strategy,
    pub points: Vec<SensitivityPoint>,
    pub spread: Option<f64>,
    /// Medium is strictly above both neighbours or strictly below both.
    pub non_monotonic: bool,
}

impl SensitivityCurve {
    pub fn accuracy_at(&self, length: LengthClass) -> Option<f64> {
        self.points
            .iter()
            .find(|p| p.length_class == length)
            .and_then(|p| p.accuracy)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Totals {
    pub tasks: usize,
    pub attempts: usize,
    pub exact_matches: usize,
    pub errors: usize,
    pub accuracy: Option<f64>,
    pub error_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSummary {
    pub strategies: Vec<Strategy>,
    pub length_classes: Vec<LengthClass>,
    pub groups: Vec<GroupMetrics>,
    pub disagreement: Vec<DisagreementEntry>,
    pub sensitivity: Vec<SensitivityCurve>,
    pub totals: Totals,
}

impl MetricsSummary {
    pub fn group(&self, strategy: Strategy, length: LengthClass) -> Option<&GroupMetrics> {
        self.groups
            .iter()
            .find(|g| g.strategy == strategy && g.length_class == length)
    }

    pub fn accuracy(&self, strategy: Strategy, length: LengthClass) -> Option<f64> {
        self.group(strategy, length).map(|g| g.accuracy)
    }

    pub fn error_rate(&self, strategy: Strategy, length: LengthClass) -> Option<f64> {
        self.group(strategy, length).map(|g| g.error_rate)
    }

    /// Entry for an unordered strategy pair; argument order does not matter.
    pub fn disagreement_entry(
        &self,
        a: Strategy,
        b: Strategy,
        length: LengthClass,
    ) -> Option<&DisagreementEntry> {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.disagreement.iter().find(|e| {
            e.length_class == length && e.strategy_a == first && e.strategy_b == second
        })
    }

    /// Disagreement rate between two strategies. A strategy never disagrees
    /// with itself once it has answered anything at that length.
    pub fn disagreement(&self, a: Strategy, b: Strategy, length: LengthClass) -> Option<f64> {
        if a == b {
            return self
                .group(a, length)
                .filter(|g| g.answered() > 0)
                .map(|_| 0.0);
        }
        self.disagreement_entry(a, b, length).and_then(|e| e.rate)
    }

    pub fn sensitivity_curve(&self, strategy: Strategy) -> Option<&SensitivityCurve> {
        self.sensitivity.iter().find(|c| c.strategy == strategy)
    }
}

// ===== Evaluator =====

/// Scores run results against ground truth and reduces them to a
/// [`MetricsSummary`].
#[derive(Debug, Clone)]
pub struct Evaluator {
    ground_truth: HashMap<TaskId, String>,
    exact: AccuracyCalculator,
    lenient: AccuracyCalculator,
    distance: SemanticDistance,
}

impl Evaluator {
    pub fn new(ground_truth: HashMap<TaskId, String>) -> Self {
        Self {
            ground_truth,
            exact: AccuracyCalculator::new(ComparisonMode::ExactMatch),
            lenient: AccuracyCalculator::new(ComparisonMode::FinalAnswer),
            distance: SemanticDistance::new(),
        }
    }

    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        Self::new(
            tasks
                .into_iter()
                .map(|t| (t.id.clone(), t.ground_truth.clone()))
                .collect(),
        )
    }

    /// Validates and scores each result, returned in canonical key order.
    ///
    /// Fails on the first record that has both or neither of output and
    /// error, repeats a key, or names a task without ground truth.
    pub fn score(&self, results: &[RunResult]) -> Result<Vec<ScoredRun>> {
        let mut seen = HashSet::with_capacity(results.len());
        let mut scored = Vec::with_capacity(results.len());

        for result in results {
            result.validate()?;
            let key = result.key();
            if !seen.insert(key.clone()) {
                return Err(CoreError::Evaluation(EvaluationError::DuplicateRun(key)));
            }
            let truth = self
                .ground_truth
                .get(&result.task_id)
                .ok_or_else(|| CoreError::Evaluation(EvaluationError::UnknownTask(key.clone())))?;

            let run = match &result.raw_output {
                Some(output) => ScoredRun {
                    key,
                    normalized_output: Some(normalize(output)),
                    correct: self.exact.is_correct(output, truth),
                    lenient_correct: self.lenient.is_correct(output, truth),
                    error_kind: None,
                    semantic_distance: Some(self.distance.distance(output, truth)),
                    output_words: Some(word_count(output)),
                    latency_ms: result.latency_ms,
                },
                None => ScoredRun {
                    key,
                    normalized_output: None,
                    correct: false,
                    lenient_correct: false,
                    error_kind: result.error.as_ref().map(|e| e.kind),
                    semantic_distance: None,
                    output_words: None,
                    latency_ms: result.latency_ms,
                },
            };
            scored.push(run);
        }

        scored.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(scored)
    }

    pub fn summarize(&self, results: &[RunResult]) -> Result<MetricsSummary> {
        let scored = self.score(results)?;
        let summary = summarize_scored(&scored);
        info!(
            results = results.len(),
            groups = summary.groups.len(),
            accuracy = ?summary.totals.accuracy,
            "Summarized run results"
        );
        Ok(summary)
    }
}

/// Builds the summary from already validated, scored runs.
pub fn summarize_scored(scored: &[ScoredRun]) -> MetricsSummary {
    let strategies: BTreeSet<Strategy> = scored.iter().map(|r| r.key.strategy).collect();
    let length_classes: BTreeSet<LengthClass> = scored.iter().map(|r| r.key.length_class).collect();

    let mut by_group: BTreeMap<(Strategy, LengthClass), Vec<&ScoredRun>> = BTreeMap::new();
    for run in scored {
        by_group
            .entry((run.key.strategy, run.key.length_class))
            .or_default()
            .push(run);
    }

    let groups: Vec<GroupMetrics> = by_group
        .iter()
        .map(|(&(strategy, length_class), runs)| group_metrics(strategy, length_class, runs))
        .collect();

    let disagreement = disagreement_entries(&by_group, &strategies, &length_classes);

    let sensitivity = strategies
        .iter()
        .map(|&strategy| sensitivity_curve(strategy, &groups))
        .collect();

    MetricsSummary {
        strategies: strategies.into_iter().collect(),
        length_classes: length_classes.into_iter().collect(),
        groups,
        disagreement,
        sensitivity,
        totals: totals(scored),
    }
}

fn group_metrics(strategy: Strategy, length_class: LengthClass, runs: &[&ScoredRun]) -> GroupMetrics {
    let attempts = runs.len();
    let exact_matches = runs.iter().filter(|r| r.correct).count();
    let lenient_matches = runs.iter().filter(|r| r.lenient_correct).count();
    let errors = runs.iter().filter(|r| r.is_error()).count();

    let distances: Vec<f64> = runs.iter().filter_map(|r| r.semantic_distance).collect();
    let words: Vec<f64> = runs
        .iter()
        .filter_map(|r| r.output_words.map(|w| w as f64))
        .collect();
    let latencies: Vec<f64> = runs.iter().map(|r| r.latency_ms as f64).collect();

    let mut error_kinds = BTreeMap::new();
    for kind in runs.iter().filter_map(|r| r.error_kind) {
        *error_kinds.entry(kind).or_insert(0) += 1;
    }

    debug!(
        strategy = %strategy,
        length_class = %length_class,
        attempts,
        exact_matches,
        errors,
        "Group scored"
    );

    GroupMetrics {
        strategy,
        length_class,
        attempts,
        exact_matches,
        errors,
        accuracy: ratio(exact_matches, attempts),
        error_rate: ratio(errors, attempts),
        lenient_matches,
        lenient_accuracy: ratio(lenient_matches, attempts),
        mean_semantic_distance: MetricAggregator::mean(&distances),
        mean_output_words: MetricAggregator::mean(&words),
        latency_ms: MetricAggregator::aggregate(&latencies),
        error_kinds,
    }
}

fn disagreement_entries(
    by_group: &BTreeMap<(Strategy, LengthClass), Vec<&ScoredRun>>,
    strategies: &BTreeSet<Strategy>,
    length_classes: &BTreeSet<LengthClass>,
) -> Vec<DisagreementEntry> {
    let strategies: Vec<Strategy> = strategies.iter().copied().collect();
    let mut entries = Vec::new();

    for &length_class in length_classes {
        for (i, &strategy_a) in strategies.iter().enumerate() {
            let outputs_a = answered_outputs(by_group, strategy_a, length_class);
            for &strategy_b in &strategies[i + 1..] {
                let outputs_b = answered_outputs(by_group, strategy_b, length_class);

                let mut shared = 0;
                let mut differing = 0;
                for (task_id, out_a) in &outputs_a {
                    if let Some(out_b) = outputs_b.get(task_id) {
                        shared += 1;
                        if out_a != out_b {
                            differing += 1;
                        }
                    }
                }

                entries.push(DisagreementEntry {
                    length_class,
                    strategy_a,
                    strategy_b,
                    shared,
                    differing,
                    rate: (shared > 0).then(|| ratio(differing, shared)),
                });
            }
        }
    }

    entries
}

/// Normalized outputs of the non-error attempts in one group, by task.
fn answered_outputs<'a>(
    by_group: &'a BTreeMap<(Strategy, LengthClass), Vec<&'a ScoredRun>>,
    strategy: Strategy,
    length: LengthClass,
) -> HashMap<&'a TaskId, &'a str> {
    by_group
        .get(&(strategy, length))
        .map(|runs| {
            runs.iter()
                .filter_map(|r| r.normalized_output.as_deref().map(|o| (&r.key.task_id, o)))
                .collect()
        })
        .unwrap_or_default()
}

fn sensitivity_curve(strategy: Strategy, groups: &[GroupMetrics]) -> SensitivityCurve {
    let points: Vec<SensitivityPoint> = LengthClass::ALL
        .iter()
        .map(|&length_class| SensitivityPoint {
            length_class,
            accuracy: groups
                .iter()
                .find(|g| g.strategy == strategy && g.length_class == length_class)
                .map(|g| g.accuracy),
        })
        .collect();

    let present: Vec<f64> = points.iter().filter_map(|p| p.accuracy).collect();

    let non_monotonic = match (points[0].accuracy, points[1].accuracy, points[2].accuracy) {
        (Some(short), Some(medium), Some(long)) => {
            (medium > short && medium > long) || (medium < short && medium < long)
        }
        _ => false,
    };

    SensitivityCurve {
        strategy,
        points,
        spread: StatisticalAnalyzer::sample_std_dev(&present),
        non_monotonic,
    }
}

fn totals(scored: &[ScoredRun]) -> Totals {
    let attempts = scored.len();
    let exact_matches = scored.iter().filter(|r| r.correct).count();
    let errors = scored.iter().filter(|r| r.is_error()).count();
    let tasks = scored
        .iter()
        .map(|r| &r.key.task_id)
        .collect::<HashSet<_>>()
        .len();

    Totals {
        tasks,
        attempts,
        exact_matches,
        errors,
        accuracy: (attempts > 0).then(|| ratio(exact_matches, attempts)),
        error_rate: (attempts > 0).then(|| ratio(errors, attempts)),
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
