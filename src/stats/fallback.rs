//! Distribution-based fallback values
//!
//! When live measurement cannot produce a trustworthy number the engine
//! substitutes a draw from a realistic distribution. Every value produced
//! here must be tagged synthetic by the caller.

use crate::error::{AppError, Result};
use crate::models::DistributionBucket;
use rand::Rng;

/// Reject empty tables, inverted ranges and out-of-range probabilities
pub fn validate_buckets(buckets: &[DistributionBucket]) -> Result<()> {
    if buckets.is_empty() {
        return Err(AppError::config("Fallback distribution needs at least one bucket"));
    }

    for bucket in buckets {
        if !bucket.min.is_finite() || !bucket.max.is_finite() || bucket.min < 0.0 || bucket.min > bucket.max {
            return Err(AppError::config(format!(
                "Invalid fallback bucket range [{}, {}]",
                bucket.min, bucket.max
            )));
        }
        if !(0.0..=1.0).contains(&bucket.probability) {
            return Err(AppError::config(format!(
                "Fallback bucket probability must be within [0, 1], got {}",
                bucket.probability
            )));
        }
    }

    if buckets.iter().all(|b| b.probability == 0.0) {
        return Err(AppError::config("Fallback bucket probabilities cannot all be zero"));
    }

    Ok(())
}

/// Draw one value: pick a bucket by cumulative probability, then a uniform
/// value inside it. Falls back to the last bucket when the probabilities sum
/// to slightly under one.
pub fn distribution_sample<R: Rng + ?Sized>(buckets: &[DistributionBucket], rng: &mut R) -> Result<f64> {
    validate_buckets(buckets).map_err(|e| AppError::statistics(e.to_string()))?;

    let draw: f64 = rng.gen();
    let mut cumulative = 0.0;
    let mut chosen = buckets[buckets.len() - 1];
    for bucket in buckets {
        cumulative += bucket.probability;
        if draw <= cumulative {
            chosen = *bucket;
            break;
        }
    }

    let position: f64 = rng.gen();
    Ok(chosen.min + position * (chosen.max - chosen.min))
}

/// Source of synthetic values for runs that could not measure
pub trait FallbackEstimator: Send + Sync {
    /// Produce a plausible aggregate from the given distribution
    fn estimate(&self, buckets: &[DistributionBucket]) -> Result<f64>;

    /// Jitter a synthetic value for backfilled chart points
    fn vary(&self, value: f64) -> f64;
}

/// Default estimator backed by the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributionFallback;

impl FallbackEstimator for DistributionFallback {
    fn estimate(&self, buckets: &[DistributionBucket]) -> Result<f64> {
        distribution_sample(buckets, &mut rand::thread_rng())
    }

    fn vary(&self, value: f64) -> f64 {
        value * rand::thread_rng().gen_range(0.9..1.1)
    }
}
