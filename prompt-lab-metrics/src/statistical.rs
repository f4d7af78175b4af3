use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, DiscreteCDF};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticalResult {
    pub statistic: f64,
    pub p_value: Option<f64>,
}

pub struct StatisticalAnalyzer;

impl StatisticalAnalyzer {
    /// Sample standard deviation (n - 1). `Some(0.0)` for a single value and
    /// `None` when there are no values.
    pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
        match values.len() {
            0 => None,
            1 => Some(0.0),
            _ => Some(values.std_dev()),
        }
    }

    /// Exact two-sided sign test over paired outcomes.
    ///
    /// `positive` and `negative` are the counts of pairs that moved in each
    /// direction; ties are excluded by the caller. The statistic is the
    /// smaller of the two counts. `p_value` is `None` when there are no
    /// untied pairs.
    pub fn sign_test(positive: usize, negative: usize) -> StatisticalResult {
        let n = positive + negative;
        let k = positive.min(negative);
        if n == 0 {
            return StatisticalResult {
                statistic: 0.0,
                p_value: None,
            };
        }

        let p_value = Binomial::new(0.5, n as u64)
            .ok()
            .map(|dist| (2.0 * dist.cdf(k as u64)).min(1.0));

        StatisticalResult {
            statistic: k as f64,
            p_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_test_balanced_is_not_significant() {
        let result = StatisticalAnalyzer::sign_test(5, 5);
        assert_eq!(result.p_value, Some(1.0));
    }

    #[test]
    fn sign_test_one_sided_sweep() {
        // P(X <= 0) for Binomial(8, 0.5) is 1/256.
        let result = StatisticalAnalyzer::sign_test(8, 0);
        let p = result.p_value.unwrap();
        assert!((p - 2.0 / 256.0).abs() < 1e-12);
    }

    #[test]
    fn sign_test_without_pairs_has_no_p_value() {
        assert_eq!(StatisticalAnalyzer::sign_test(0, 0).p_value, None);
    }

    #[test]
    fn std_dev_edge_cases() {
        assert_eq!(StatisticalAnalyzer::sample_std_dev(&[]), None);
        assert_eq!(StatisticalAnalyzer::sample_std_dev(&[0.4]), Some(0.0));
        let sd = StatisticalAnalyzer::sample_std_dev(&[1.0, 2.0, 3.0]).unwrap();
        assert!((sd - 1.0).abs() < 1e-12);
    }
}
