use approx::assert_relative_eq;
use prompt_lab_core::MetricCalculator;
use prompt_lab_metrics::calculators::*;

// ===== Accuracy Calculator =====

#[tokio::test]
async fn test_accuracy_exact_match_scores_one() {
    let calculator = AccuracyCalculator::default();
    let output = calculator
        .calculate(MetricInput::new("Negative.", "negative"))
        .await
        .unwrap();
    assert_eq!(output.score, 1.0);
    assert_eq!(output.metadata["comparison_mode"], "exact_match");
}

#[tokio::test]
async fn test_accuracy_without_reference_scores_zero() {
    let calculator = AccuracyCalculator::default();
    let input = MetricInput {
        predicted: "yes".to_string(),
        reference: None,
    };
    assert_eq!(calculator.calculate(input).await.unwrap().score, 0.0);
}

#[tokio::test]
async fn test_final_answer_mode_reads_marker() {
    let calculator = AccuracyCalculator::new(ComparisonMode::FinalAnswer);
    let output = calculator
        .calculate(MetricInput::new("Thought: 5 + 7\nFinal answer: 12", "12"))
        .await
        .unwrap();
    assert_eq!(output.score, 1.0);

    let exact = AccuracyCalculator::new(ComparisonMode::ExactMatch);
    let output = exact
        .calculate(MetricInput::new("Thought: 5 + 7\nFinal answer: 12", "12"))
        .await
        .unwrap();
    assert_eq!(output.score, 0.0);
}

// ===== Semantic Distance =====

#[test]
fn test_distance_identical_is_zero() {
    let distance = SemanticDistance::new();
    assert_relative_eq!(distance.distance("Positive!", "positive"), 0.0);
    assert_relative_eq!(distance.distance("", ""), 0.0);
}

#[test]
fn test_distance_disjoint_is_one() {
    let distance = SemanticDistance::new();
    assert_relative_eq!(distance.distance("yes", "no"), 1.0);
}

#[test]
fn test_distance_partial_overlap() {
    let distance = SemanticDistance::new();
    // {positive, answer} vs {positive}: 1 shared of 2.
    assert_relative_eq!(distance.distance("positive answer", "positive"), 0.5);
}

#[tokio::test]
async fn test_distance_calculator_reports_method() {
    let output = SemanticDistance::new()
        .calculate(MetricInput::new("very positive", "positive"))
        .await
        .unwrap();
    assert_relative_eq!(output.score, 0.5);
    assert_eq!(output.metadata["method"], "jaccard");
}
