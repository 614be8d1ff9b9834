//! Throughput sampling
//!
//! A run repeats timed transfers until its time budget is spent or too many
//! transfers have failed. Downloads are timed in fixed windows while the body
//! streams in; uploads are timed per batch of concurrent POSTs. Each accepted
//! speed becomes a measured [`Sample`]. At the end the measured samples are
//! reduced to one value with a high percentile; a run with too few real
//! samples reports a value drawn from the fallback distribution instead, and
//! says so.

pub mod control;
mod download;
pub mod selection;
mod upload;

pub use control::{CancelHandle, RunStatus, ThroughputController};
pub use selection::{RandomSelector, RoundRobinSelector, Selector};

use crate::{
    client::Transport,
    error::Result,
    logging::MeasurementLogger,
    models::{Direction, MeasurementSource, Reading, Sample, SampleOrigin, ThroughputConfig},
    stats::{self, DistributionFallback, FallbackEstimator},
};
use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

pub type SpeedCallback = Arc<dyn Fn(f64) + Send + Sync>;
pub type DataPointCallback = Arc<dyn Fn(&Sample) + Send + Sync>;

/// Observers of a running measurement. All are optional.
///
/// Callbacks run on the sampler task and must not block.
#[derive(Clone, Default)]
pub struct ThroughputCallbacks {
    on_speed: Option<SpeedCallback>,
    on_progress: Option<SpeedCallback>,
    on_data_point: Option<DataPointCallback>,
    on_complete: Option<SpeedCallback>,
}

impl ThroughputCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live speed in Mbps, after every sample
    pub fn on_speed(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_speed = Some(Arc::new(callback));
        self
    }

    /// Progress in percent, never decreasing
    pub fn on_progress(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Every chart point, measured or synthetic
    pub fn on_data_point(mut self, callback: impl Fn(&Sample) + Send + Sync + 'static) -> Self {
        self.on_data_point = Some(Arc::new(callback));
        self
    }

    /// Final value, at most once per run
    pub fn on_complete(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for ThroughputCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThroughputCallbacks")
            .field("on_speed", &self.on_speed.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_data_point", &self.on_data_point.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Delivers callbacks unless the run has been cancelled
pub(crate) struct Emitter {
    callbacks: ThroughputCallbacks,
    handle: CancelHandle,
}

impl Emitter {
    fn new(callbacks: ThroughputCallbacks, handle: CancelHandle) -> Self {
        Self { callbacks, handle }
    }

    fn live(&self) -> bool {
        !self.handle.is_cancelled()
    }

    fn speed(&self, mbps: f64) {
        if let (true, Some(callback)) = (self.live(), &self.callbacks.on_speed) {
            callback(mbps);
        }
    }

    fn progress(&self, percent: f64) {
        if let (true, Some(callback)) = (self.live(), &self.callbacks.on_progress) {
            callback(percent);
        }
    }

    fn data_point(&self, sample: &Sample) {
        if let (true, Some(callback)) = (self.live(), &self.callbacks.on_data_point) {
            callback(sample);
        }
    }

    fn complete(&self, mbps: f64) {
        if let (true, Some(callback)) = (self.live(), &self.callbacks.on_complete) {
            callback(mbps);
        }
    }
}

/// Mutable state of one run
pub(crate) struct RunState {
    started: Instant,
    samples: Vec<Sample>,
    measured: Vec<f64>,
    failed_attempts: u32,
    last_good_speed: Option<f64>,
    progress: f64,
}

impl RunState {
    fn new(started: Instant) -> Self {
        Self {
            started,
            samples: Vec::new(),
            measured: Vec::new(),
            failed_attempts: 0,
            last_good_speed: None,
            progress: 0.0,
        }
    }

    /// Seconds since start, never earlier than the last emitted sample
    fn sample_time(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        match self.samples.last() {
            Some(last) => elapsed.max(last.time),
            None => elapsed,
        }
    }

    /// Record a live speed. Returns `false` when it fails the sanity band.
    pub(crate) fn record_speed(
        &mut self,
        mbps: f64,
        now: Instant,
        config: &ThroughputConfig,
        emitter: &Emitter,
    ) -> bool {
        if !config.accepts_speed(mbps) {
            return false;
        }

        let sample = Sample::measured(self.sample_time(now), mbps);
        self.samples.push(sample);
        self.measured.push(mbps);
        self.last_good_speed = Some(mbps);

        emitter.speed(mbps);
        emitter.data_point(&sample);
        self.update_progress(now, config.duration(), emitter);
        true
    }

    /// Count a failed transfer and keep the chart moving with a degraded point
    pub(crate) fn record_failure(&mut self, now: Instant, config: &ThroughputConfig, emitter: &Emitter) {
        self.failed_attempts += 1;

        if let Some(last) = self.last_good_speed {
            let value = stats::sanitize(last * config.degraded_factor);
            let sample = Sample::new(self.sample_time(now), value, SampleOrigin::Degraded);
            self.samples.push(sample);

            emitter.speed(value);
            emitter.data_point(&sample);
        }
    }

    fn update_progress(&mut self, now: Instant, duration: Duration, emitter: &Emitter) -> f64 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let percent = (elapsed / duration.as_secs_f64() * 100.0).min(100.0);

        self.progress = self.progress.max(percent);
        emitter.progress(self.progress);
        self.progress
    }
}

/// Final result of a completed run
#[derive(Debug, Clone)]
pub struct ThroughputOutcome {
    pub direction: Direction,
    /// Reported speed in Mbps; always finite and non-negative
    pub value: f64,
    pub source: MeasurementSource,
    /// Every sample in emission order, including synthetic ones
    pub samples: Vec<Sample>,
    pub measured_samples: usize,
    pub failed_attempts: u32,
    pub elapsed: Duration,
}

impl ThroughputOutcome {
    pub fn reading(&self) -> Reading {
        Reading {
            value: self.value,
            source: self.source,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.source == MeasurementSource::Synthetic
    }
}

/// A configured throughput run, ready to start
pub struct ThroughputTest {
    direction: Direction,
    transport: Arc<dyn Transport>,
    config: Arc<ThroughputConfig>,
    selector: Arc<dyn Selector>,
    fallback: Arc<dyn FallbackEstimator>,
    logger: Option<MeasurementLogger>,
    payloads: Arc<Vec<Bytes>>,
}

impl ThroughputTest {
    /// Validate the configuration and prepare the upload payload pool
    pub fn new(direction: Direction, transport: Arc<dyn Transport>, config: ThroughputConfig) -> Result<Self> {
        config.validate(direction)?;

        let payloads = match direction {
            Direction::Upload => generate_payloads(&config.payload_sizes),
            Direction::Download => Vec::new(),
        };

        Ok(Self {
            direction,
            transport,
            config: Arc::new(config),
            selector: Arc::new(RandomSelector),
            fallback: Arc::new(DistributionFallback),
            logger: None,
            payloads: Arc::new(payloads),
        })
    }

    pub fn with_selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackEstimator>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_logger(mut self, logger: MeasurementLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn config(&self) -> &ThroughputConfig {
        &self.config
    }

    /// Spawn the run on the current tokio runtime
    pub fn start(self, callbacks: ThroughputCallbacks) -> ThroughputController {
        let handle = CancelHandle::new();
        let emitter = Emitter::new(callbacks, handle.clone());
        let task_handle = handle.clone();

        let task = tokio::spawn(async move { self.execute(emitter, task_handle).await });
        ThroughputController::new(handle, task)
    }

    async fn execute(self, emitter: Emitter, handle: CancelHandle) -> Option<ThroughputOutcome> {
        let correlation_id = match &self.logger {
            Some(logger) => Some(logger.logger().start_operation(&format!("{}_test", self.direction.as_str())).await),
            None => None,
        };

        let cancel = handle.token().clone();
        let started = Instant::now();
        let deadline = started + self.config.duration();
        let mut state = RunState::new(started);

        loop {
            let progress = state.update_progress(Instant::now(), self.config.duration(), &emitter);
            if progress >= 100.0 || state.failed_attempts >= self.config.max_failed_attempts {
                break;
            }

            let transfer = async {
                match self.direction {
                    Direction::Download => download::run_transfer(&self, &mut state, &emitter, deadline).await,
                    Direction::Upload => upload::run_batch(&self, &mut state, &emitter, deadline).await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = transfer => {}
            }

            if state.failed_attempts >= self.config.max_failed_attempts {
                if let Some(logger) = &self.logger {
                    crate::log_info!(
                        logger.logger(),
                        "{} run stopped after {} failed transfers",
                        self.direction,
                        state.failed_attempts
                    );
                }
                break;
            }

            let resume = (Instant::now() + self.config.pause()).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(resume) => {}
            }
        }

        if !handle.begin_completing() {
            self.finish_operation(correlation_id, false).await;
            return None;
        }

        let outcome = self.complete(state, &emitter).await;
        handle.mark_done();
        self.finish_operation(correlation_id, true).await;

        Some(outcome)
    }

    /// Reduce the run to one value and emit the completion callback
    async fn complete(&self, mut state: RunState, emitter: &Emitter) -> ThroughputOutcome {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.started);

        let aggregate = if state.measured.len() >= self.config.min_real_samples {
            stats::percentile(&state.measured, self.config.aggregate_percentile).ok()
        } else {
            None
        };

        let (value, source) = match aggregate {
            Some(value) => {
                if let Some(logger) = &self.logger {
                    logger
                        .log_aggregate(self.direction, value, state.measured.len(), state.failed_attempts)
                        .await;
                }
                (value, MeasurementSource::Measured)
            }
            None => {
                let value = self.synthesize(&state).await;
                self.backfill(&mut state, value, now, emitter);
                (value, MeasurementSource::Synthetic)
            }
        };

        let value = stats::sanitize(value);
        emitter.progress(100.0);
        emitter.complete(value);

        ThroughputOutcome {
            direction: self.direction,
            value,
            source,
            measured_samples: state.measured.len(),
            failed_attempts: state.failed_attempts,
            samples: state.samples,
            elapsed,
        }
    }

    async fn synthesize(&self, state: &RunState) -> f64 {
        let reason = format!(
            "{} real samples (need {}), {} failed transfers",
            state.measured.len(),
            self.config.min_real_samples,
            state.failed_attempts
        );

        let value = match self.fallback.estimate(&self.config.fallback_buckets) {
            Ok(value) => stats::sanitize(value),
            Err(e) => {
                if let Some(logger) = &self.logger {
                    crate::log_error!(logger.logger(), "{} fallback estimate failed: {}", self.direction, e);
                }
                self.config.fallback_buckets.first().map_or(0.0, |bucket| bucket.min)
            }
        };

        if let Some(logger) = &self.logger {
            logger.log_fallback(self.direction.as_str(), value, &reason).await;
        }

        value
    }

    /// Emit evenly spaced synthetic points from the last sample to now
    fn backfill(&self, state: &mut RunState, value: f64, now: Instant, emitter: &Emitter) {
        let points = self.config.backfill_points.max(1);
        let from = state.samples.last().map_or(0.0, |sample| sample.time);
        let to = state.sample_time(now);

        for index in 1..=points {
            let time = from + (to - from) * index as f64 / points as f64;
            let sample = Sample::new(time, stats::sanitize(self.fallback.vary(value)), SampleOrigin::Backfill);
            state.samples.push(sample);
            emitter.data_point(&sample);
        }
    }

    fn pick_endpoint(&self) -> &str {
        let index = self.selector.pick(self.config.endpoints.len());
        self.config.endpoints.get(index).or_else(|| self.config.endpoints.first()).map_or("", String::as_str)
    }

    fn pick_payload(&self) -> Bytes {
        let index = self.selector.pick(self.payloads.len());
        self.payloads.get(index).cloned().unwrap_or_default()
    }

    async fn finish_operation(&self, correlation_id: Option<String>, success: bool) {
        if let (Some(logger), Some(id)) = (&self.logger, correlation_id) {
            logger
                .logger()
                .end_operation(&id, &format!("{}_test", self.direction.as_str()), success)
                .await;
        }
    }
}

/// Random bytes so compressing middleboxes cannot shrink the transfer
fn generate_payloads(sizes: &[usize]) -> Vec<Bytes> {
    let mut rng = rand::thread_rng();
    sizes
        .iter()
        .map(|&size| {
            let mut buffer = vec![0u8; size];
            rng.fill(&mut buffer[..]);
            Bytes::from(buffer)
        })
        .collect()
}

/// Validate, start and return the controller of a throughput run
pub fn run_throughput_test(
    direction: Direction,
    transport: Arc<dyn Transport>,
    config: ThroughputConfig,
    callbacks: ThroughputCallbacks,
) -> Result<ThroughputController> {
    Ok(ThroughputTest::new(direction, transport, config)?.start(callbacks))
}
