use approx::assert_relative_eq;
use prompt_lab_metrics::aggregators::MetricAggregator;
use prompt_lab_metrics::statistical::StatisticalAnalyzer;

#[test]
fn test_aggregate_basic_stats() {
    let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
    let aggregated = MetricAggregator::aggregate(&values);

    assert_eq!(aggregated.count, 5);
    assert_eq!(aggregated.min, 10.0);
    assert_eq!(aggregated.max, 50.0);
    assert_relative_eq!(aggregated.mean, 30.0, epsilon = 0.01);
    assert_relative_eq!(aggregated.median, 30.0, epsilon = 0.01);
    assert_relative_eq!(aggregated.sum, 150.0);
}

#[test]
fn test_aggregate_empty_is_zeroed() {
    let aggregated = MetricAggregator::aggregate(&[]);
    assert_eq!(aggregated.count, 0);
    assert_eq!(aggregated.mean, 0.0);
}

#[test]
fn test_aggregate_percentiles_are_ordered() {
    let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
    let aggregated = MetricAggregator::aggregate(&values);
    assert!(aggregated.p50 <= aggregated.p90);
    assert!(aggregated.p90 <= aggregated.p95);
    assert!(aggregated.p95 <= aggregated.p99);
    assert!(aggregated.p99 <= aggregated.max);
}

#[test]
fn test_mean_of_empty_is_none() {
    assert_eq!(MetricAggregator::mean(&[]), None);
    assert_eq!(MetricAggregator::mean(&[2.0, 4.0]), Some(3.0));
}

#[test]
fn test_sign_test_small_sample() {
    // 3 improved, 0 worsened: P(X <= 0) = 1/8, two-sided 1/4.
    let result = StatisticalAnalyzer::sign_test(3, 0);
    assert_relative_eq!(result.p_value.unwrap(), 0.25, epsilon = 1e-12);
    assert_eq!(result.statistic, 0.0);
}
