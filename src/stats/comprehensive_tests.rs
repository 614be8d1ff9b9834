//! Comprehensive tests for the statistics functions
//!
//! Property-based tests for the reducers plus edge cases around the
//! quality score and the fallback distribution.

use super::{distribution_sample, estimate_connection_quality, median, percentile, trimmed_mean};
use crate::models::{DistributionBucket, QualityCategory};
use proptest::collection::vec;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Property-based test generators
mod generators {
    use super::*;

    /// Plausible throughput or latency values
    pub fn positive_floats() -> impl Strategy<Value = f64> {
        0.001f64..100000.0
    }

    pub fn number_vectors() -> impl Strategy<Value = Vec<f64>> {
        vec(positive_floats(), 1..500)
    }

    /// Valid bucket tables with probabilities normalised to one
    pub fn bucket_tables() -> impl Strategy<Value = Vec<DistributionBucket>> {
        vec((0.0f64..1000.0, 0.0f64..500.0, 0.01f64..1.0), 1..8).prop_map(|rows| {
            let total: f64 = rows.iter().map(|(_, _, weight)| weight).sum();
            rows.into_iter()
                .map(|(min, width, weight)| DistributionBucket::new(min, min + width, weight / total))
                .collect()
        })
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    (min, max)
}

mod property_tests {
    use super::*;

    proptest! {
        /// Median lies between min and max
        #[test]
        fn median_between_min_max(numbers in generators::number_vectors()) {
            let (min, max) = min_max(&numbers);
            let value = median(&numbers).unwrap();
            prop_assert!(value >= min && value <= max);
        }

        /// Median does not depend on input order
        #[test]
        fn median_order_independent(numbers in generators::number_vectors()) {
            let mut reversed = numbers.clone();
            reversed.reverse();
            prop_assert_eq!(median(&numbers).unwrap(), median(&reversed).unwrap());
        }

        /// Trimmed mean lies between min and max
        #[test]
        fn trimmed_mean_between_min_max(numbers in generators::number_vectors()) {
            let (min, max) = min_max(&numbers);
            let value = trimmed_mean(&numbers).unwrap();
            // Summation can drift by an ulp or two
            let slack = max.abs() * 1e-12;
            prop_assert!(value >= min - slack && value <= max + slack);
        }

        /// A single extreme outlier cannot move the trimmed mean past the
        /// largest regular value
        #[test]
        fn trimmed_mean_ignores_single_outlier(numbers in vec(1.0f64..100.0, 3..50)) {
            let mut with_outlier = numbers.clone();
            with_outlier.push(1e9);
            let (_, max) = min_max(&numbers);
            prop_assert!(trimmed_mean(&with_outlier).unwrap() <= max + 1e-9);
        }

        /// Percentile is monotone in p
        #[test]
        fn percentile_monotone_in_p(numbers in generators::number_vectors(), p1 in 0.0f64..=1.0, p2 in 0.0f64..=1.0) {
            let (low, high) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
            prop_assert!(percentile(&numbers, low).unwrap() <= percentile(&numbers, high).unwrap());
        }

        /// Percentile always returns one of the inputs
        #[test]
        fn percentile_is_an_input(numbers in generators::number_vectors(), p in -1.0f64..2.0) {
            let value = percentile(&numbers, p).unwrap();
            prop_assert!(numbers.contains(&value));
        }

        /// Score is bounded and consistent with its category
        #[test]
        fn quality_score_bounded(ping in -500.0f64..5000.0, download in -10.0f64..2000.0, upload in -10.0f64..2000.0) {
            let report = estimate_connection_quality(ping, download, upload);
            prop_assert!(report.score <= 100);
            prop_assert_eq!(report.quality, QualityCategory::from_score(report.score));
        }

        /// Better ping never lowers the score
        #[test]
        fn quality_monotone_in_ping(
            ping in 0.0f64..400.0,
            delta in 0.0f64..100.0,
            download in 0.0f64..300.0,
            upload in 0.0f64..150.0,
        ) {
            let worse = estimate_connection_quality(ping + delta, download, upload);
            let better = estimate_connection_quality(ping, download, upload);
            prop_assert!(better.score >= worse.score);
        }

        /// Fallback draws land inside one of the buckets
        #[test]
        fn fallback_draw_inside_some_bucket(buckets in generators::bucket_tables(), seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let value = distribution_sample(&buckets, &mut rng).unwrap();
            prop_assert!(value.is_finite());
            prop_assert!(buckets.iter().any(|b| value >= b.min - 1e-9 && value <= b.max + 1e-9));
        }
    }
}

mod edge_case_tests {
    use super::*;

    #[test]
    fn test_identical_measurements() {
        let numbers = vec![42.0; 25];
        assert_eq!(median(&numbers).unwrap(), 42.0);
        assert_eq!(trimmed_mean(&numbers).unwrap(), 42.0);
        assert_eq!(percentile(&numbers, 0.75).unwrap(), 42.0);
    }

    #[test]
    fn test_empty_inputs_fail() {
        assert!(median(&[]).is_err());
        assert!(trimmed_mean(&[]).is_err());
        assert!(percentile(&[], 0.75).is_err());
    }

    #[test]
    fn test_quality_category_thresholds() {
        // 0.4 * 0.5 + 0.4 * 0.25 + 0.2 * 0.0 = 0.30
        assert_eq!(estimate_connection_quality(100.0, 50.0, 0.0).quality, QualityCategory::Average);
        // 0.4 * 0.5 + 0.4 * 0.2 + 0.2 * 0.0 = 0.28
        assert_eq!(estimate_connection_quality(100.0, 40.0, 0.0).quality, QualityCategory::Poor);
        // 0.4 + 0.4 * 0.5 + 0.2 * 0.0 = 0.60
        assert_eq!(estimate_connection_quality(0.0, 100.0, 0.0).quality, QualityCategory::Good);
        // 0.4 + 0.4 * 0.5 + 0.2 * 0.5 = 0.70
        assert_eq!(estimate_connection_quality(0.0, 100.0, 50.0).quality, QualityCategory::Good);
        // 0.4 + 0.4 + 0.2 * 0.25 = 0.85
        assert_eq!(estimate_connection_quality(0.0, 200.0, 25.0).quality, QualityCategory::Excellent);
    }

    #[test]
    fn test_saturation() {
        let capped = estimate_connection_quality(0.0, 10_000.0, 10_000.0);
        assert_eq!(capped.score, 100);

        let floor = estimate_connection_quality(10_000.0, 0.0, 0.0);
        assert_eq!(floor.score, 0);
    }

    #[test]
    fn test_large_dataset() {
        let numbers: Vec<f64> = (1..=10_000).map(f64::from).collect();
        assert_eq!(median(&numbers).unwrap(), 5000.5);
        assert_eq!(percentile(&numbers, 0.75).unwrap(), 7501.0);
    }
}
