//! Latency probing
//!
//! Every configured endpoint is probed once, concurrently. Each endpoint gets
//! its own deadline; an endpoint that misses it is recorded *at* the deadline
//! rather than dropped, so a slow link still yields a (pessimistic) number.
//! The round-trip times inside the acceptable band are reduced to a median,
//! scaled by the correction factor and floored at the band minimum.

use crate::{
    client::Transport,
    error::{AppError, Result},
    logging::MeasurementLogger,
    models::{LatencyConfig, Reading},
    stats::{self, DistributionFallback, FallbackEstimator},
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Value reported to callers that expect a number when the probe failed
pub const FAILURE_SENTINEL: i64 = -1;

/// Result of one latency probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyOutcome {
    /// Median of live round trips, corrected and rounded
    Measured { millis: u32 },
    /// Drawn from the fallback distribution because nothing usable came back
    Synthetic { millis: u32 },
    /// No usable round trip and fallback disabled
    Failed,
    Cancelled,
}

impl LatencyOutcome {
    pub fn millis(&self) -> Option<u32> {
        match self {
            Self::Measured { millis } | Self::Synthetic { millis } => Some(*millis),
            Self::Failed | Self::Cancelled => None,
        }
    }

    /// Milliseconds, or [`FAILURE_SENTINEL`] when there is no value
    pub fn as_sentinel_millis(&self) -> i64 {
        self.millis().map_or(FAILURE_SENTINEL, i64::from)
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic { .. })
    }

    pub fn reading(&self) -> Option<Reading> {
        match self {
            Self::Measured { millis } => Some(Reading::measured(f64::from(*millis))),
            Self::Synthetic { millis } => Some(Reading::synthetic(f64::from(*millis))),
            Self::Failed | Self::Cancelled => None,
        }
    }
}

/// Concurrent latency probe over a pool of endpoints
pub struct LatencyProbe {
    transport: Arc<dyn Transport>,
    config: LatencyConfig,
    fallback: Arc<dyn FallbackEstimator>,
    logger: Option<MeasurementLogger>,
}

impl LatencyProbe {
    pub fn new(transport: Arc<dyn Transport>, config: LatencyConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            transport,
            config,
            fallback: Arc::new(DistributionFallback),
            logger: None,
        })
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackEstimator>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_logger(mut self, logger: MeasurementLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &LatencyConfig {
        &self.config
    }

    /// Probe every endpoint and reduce the round trips to one value
    pub async fn run(&self, cancel: &CancellationToken) -> LatencyOutcome {
        let correlation_id = match &self.logger {
            Some(logger) => Some(logger.logger().start_operation("latency_probe").await),
            None => None,
        };

        let deadline = Instant::now() + self.config.timeout();
        let probes = join_all(self.config.endpoints.iter().map(|endpoint| self.probe_endpoint(endpoint)));

        let rtts = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.finish_operation(correlation_id, false).await;
                return LatencyOutcome::Cancelled;
            }
            rtts = probes => Some(rtts.into_iter().flatten().collect::<Vec<f64>>()),
            _ = sleep_until(deadline) => None,
        };

        let outcome = match rtts {
            Some(rtts) => match aggregate_latency(&rtts, &self.config) {
                Some(millis) => LatencyOutcome::Measured { millis },
                None => {
                    let reason = if rtts.is_empty() {
                        "no endpoint answered"
                    } else {
                        "no round trip inside the acceptable band"
                    };
                    self.failure_outcome(reason).await
                }
            },
            None => self.failure_outcome("overall probe timeout elapsed").await,
        };

        self.finish_operation(correlation_id, !matches!(outcome, LatencyOutcome::Failed)).await;
        outcome
    }

    /// Draw a synthetic latency from the fallback distribution
    pub async fn synthesize(&self, reason: &str) -> Result<u32> {
        let value = self
            .fallback
            .estimate(&self.config.fallback_buckets)
            .map_err(|e| AppError::statistics(format!("Latency fallback failed: {}", e)))?;
        let millis = stats::sanitize(value).round() as u32;

        if let Some(logger) = &self.logger {
            logger.log_fallback("latency", f64::from(millis), reason).await;
        }

        Ok(millis)
    }

    async fn failure_outcome(&self, reason: &str) -> LatencyOutcome {
        if !self.config.fallback_on_failure {
            if let Some(logger) = &self.logger {
                crate::log_warn!(logger.logger(), "Latency probe failed: {}", reason);
            }
            return LatencyOutcome::Failed;
        }

        match self.synthesize(reason).await {
            Ok(millis) => LatencyOutcome::Synthetic { millis },
            Err(_) => LatencyOutcome::Failed,
        }
    }

    /// One endpoint's round trip in ms. `None` when both mechanisms failed.
    async fn probe_endpoint(&self, endpoint: &str) -> Option<f64> {
        let deadline = Instant::now() + self.config.endpoint_timeout();

        let attempt = async {
            let started = Instant::now();
            match self.transport.probe(endpoint).await {
                Ok(()) => Ok(started),
                Err(primary) => {
                    let started = Instant::now();
                    self.transport
                        .probe_fallback(endpoint)
                        .await
                        .map(|()| started)
                        .map_err(|_| primary)
                }
            }
        };

        let (rtt, error) = match timeout_at(deadline, attempt).await {
            Ok(Ok(started)) => (Some(started.elapsed().as_secs_f64() * 1000.0), None),
            Ok(Err(e)) => (None, Some(e)),
            Err(_) => (Some(self.config.endpoint_timeout_ms as f64), None),
        };

        if let Some(logger) = &self.logger {
            logger.log_probe(endpoint, rtt, error.as_ref()).await;
        }

        rtt
    }

    async fn finish_operation(&self, correlation_id: Option<String>, success: bool) {
        if let (Some(logger), Some(id)) = (&self.logger, correlation_id) {
            logger.logger().end_operation(&id, "latency_probe", success).await;
        }
    }
}

/// Reduce raw round trips to the reported latency.
///
/// Keeps values inside `[min_acceptable_ms, max_acceptable_ms]`, takes the
/// median, applies the correction factor and floors the result at the band
/// minimum. `None` when no value survives the band filter.
pub fn aggregate_latency(rtts: &[f64], config: &LatencyConfig) -> Option<u32> {
    let usable: Vec<f64> = rtts
        .iter()
        .copied()
        .filter(|rtt| rtt.is_finite() && *rtt >= config.min_acceptable_ms && *rtt <= config.max_acceptable_ms)
        .collect();

    let median = stats::median(&usable).ok()?;
    let corrected = (median * config.correction_factor).max(config.min_acceptable_ms);

    Some(corrected.round() as u32)
}

/// Probe the configured endpoints once with a fresh transport-level run
pub async fn probe_latency(transport: Arc<dyn Transport>, config: LatencyConfig) -> Result<LatencyOutcome> {
    let probe = LatencyProbe::new(transport, config)?;
    Ok(probe.run(&CancellationToken::new()).await)
}
