//! Statistics used to reduce raw timings into reported values
//!
//! Everything here is a pure function. The prober takes the median of its
//! round-trip times, the sampler takes a percentile of its samples, and the
//! orchestrator scores the final readings.

pub mod fallback;

#[cfg(test)]
mod comprehensive_tests;

pub use fallback::{distribution_sample, DistributionFallback, FallbackEstimator};

use crate::error::{AppError, Result};
use crate::models::{QualityCategory, QualityReport};
use std::time::Duration;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Middle value, or the mean of the two middle values for even lengths
pub fn median(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(AppError::statistics("Cannot take the median of an empty sample set"));
    }

    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Ok(sorted[mid])
    }
}

/// Mean after dropping the lowest and highest value. Sets of three or fewer
/// values are averaged as-is.
pub fn trimmed_mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(AppError::statistics("Cannot take the trimmed mean of an empty sample set"));
    }

    let sorted = sorted(values);
    let kept = if sorted.len() > 3 { &sorted[1..sorted.len() - 1] } else { &sorted[..] };
    Ok(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Nearest-rank percentile: `sorted[floor(len * p)]`, index clamped to the
/// valid range. `p` is a fraction, `0.75` for the 75th percentile.
pub fn percentile(values: &[f64], p: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(AppError::statistics("Cannot take a percentile of an empty sample set"));
    }
    if p.is_nan() {
        return Err(AppError::statistics("Percentile rank cannot be NaN"));
    }

    let sorted = sorted(values);
    let rank = (sorted.len() as f64 * p).floor();
    let index = rank.clamp(0.0, (sorted.len() - 1) as f64) as usize;
    Ok(sorted[index])
}

/// Transfer rate in megabits per second. `None` for a zero-length interval.
pub fn megabits_per_second(bytes: u64, elapsed: Duration) -> Option<f64> {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return None;
    }

    let mbps = (bytes as f64 * 8.0) / seconds / 1_000_000.0;
    mbps.is_finite().then_some(mbps)
}

/// Map anything that is not a finite, non-negative number to zero
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}

fn unit_interval(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Weighted 0-100 score from ping (ms), download (Mbps) and upload (Mbps)
///
/// Ping contributes 40% (200 ms or worse scores zero), download 40%
/// (saturating at 200 Mbps) and upload 20% (saturating at 100 Mbps).
/// A non-finite component contributes nothing.
pub fn estimate_connection_quality(ping: f64, download: f64, upload: f64) -> QualityReport {
    let ping_score = unit_interval((200.0 - ping) / 200.0);
    let download_score = unit_interval(download / 200.0);
    let upload_score = unit_interval(upload / 100.0);

    let weighted = ping_score * 0.4 + download_score * 0.4 + upload_score * 0.2;
    let score = (weighted * 100.0).round().clamp(0.0, 100.0) as u8;

    QualityReport {
        score,
        quality: QualityCategory::from_score(score),
    }
}
