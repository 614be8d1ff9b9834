//! Full test sequencing: ping, then download, then upload
//!
//! `SpeedTest` owns the session state a UI would render. Every stage writes
//! into it through callbacks tagged with the session generation; `reset()`
//! bumps the generation, so a stage that is still winding down can never
//! write into the next session.

use crate::{
    client::{ReqwestTransport, Transport},
    error::{AppError, Result},
    logging::MeasurementLogger,
    models::{Config, Direction, QualityReport, Reading, Sample, Stage, TestResults},
    probe::{LatencyOutcome, LatencyProbe},
    sampler::{CancelHandle, Selector, ThroughputCallbacks, ThroughputTest},
    stats::{self, DistributionFallback, FallbackEstimator},
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct TestSnapshot {
    pub stage: Stage,
    /// Live speed of the running stage in Mbps
    pub current_speed: f64,
    /// Progress of the running stage in percent
    pub progress: f64,
    pub results: TestResults,
    pub download_samples: Vec<Sample>,
    pub upload_samples: Vec<Sample>,
}

struct SessionState {
    stage: Stage,
    current_speed: f64,
    progress: f64,
    results: TestResults,
    download_samples: Vec<Sample>,
    upload_samples: Vec<Sample>,
    generation: u64,
    probe_cancel: Option<CancellationToken>,
    active: Option<CancelHandle>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            current_speed: 0.0,
            progress: 0.0,
            results: TestResults::default(),
            download_samples: Vec::new(),
            upload_samples: Vec::new(),
            generation: 0,
            probe_cancel: None,
            active: None,
        }
    }

    fn samples_mut(&mut self, direction: Direction) -> &mut Vec<Sample> {
        match direction {
            Direction::Download => &mut self.download_samples,
            Direction::Upload => &mut self.upload_samples,
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sequenced ping, download and upload measurement
pub struct SpeedTest {
    transport: Arc<dyn Transport>,
    config: Config,
    selector: Option<Arc<dyn Selector>>,
    fallback: Arc<dyn FallbackEstimator>,
    logger: MeasurementLogger,
    state: Arc<Mutex<SessionState>>,
}

impl SpeedTest {
    pub fn new(transport: Arc<dyn Transport>, config: Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            transport,
            logger: MeasurementLogger::new(&config),
            config,
            selector: None,
            fallback: Arc::new(DistributionFallback),
            state: Arc::new(Mutex::new(SessionState::new())),
        })
    }

    /// Measure over HTTP with the default client
    pub fn with_reqwest(config: Config) -> Result<Self> {
        Self::new(Arc::new(ReqwestTransport::new()?), config)
    }

    pub fn with_selector(mut self, selector: Arc<dyn Selector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackEstimator>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_logger(mut self, logger: MeasurementLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> TestSnapshot {
        let state = lock(&self.state);
        TestSnapshot {
            stage: state.stage,
            current_speed: state.current_speed,
            progress: state.progress,
            results: state.results,
            download_samples: state.download_samples.clone(),
            upload_samples: state.upload_samples.clone(),
        }
    }

    pub fn stage(&self) -> Stage {
        lock(&self.state).stage
    }

    pub fn results(&self) -> TestResults {
        lock(&self.state).results
    }

    /// Gauge full scale for the current stage
    pub fn gauge_max(&self) -> f64 {
        self.stage().gauge_max()
    }

    /// Quality score of the last completed session
    pub fn quality(&self) -> Option<QualityReport> {
        let results = self.results();
        match (results.ping, results.download, results.upload) {
            (Some(ping), Some(download), Some(upload)) => Some(stats::estimate_connection_quality(
                ping.value,
                download.value,
                upload.value,
            )),
            _ => None,
        }
    }

    /// Run ping, download and upload in order.
    ///
    /// Only allowed from [`Stage::Idle`]. Returns `Ok(None)` when the session
    /// was reset before it finished.
    pub async fn start(&self) -> Result<Option<TestResults>> {
        let (generation, probe_cancel) = {
            let mut state = lock(&self.state);
            if state.stage != Stage::Idle {
                return Err(AppError::validation(format!(
                    "A test can only start from idle, current stage is {}",
                    state.stage
                )));
            }

            state.generation += 1;
            state.stage = Stage::Ping;
            state.progress = 0.0;
            state.current_speed = 0.0;
            state.results.clear();
            state.download_samples.clear();
            state.upload_samples.clear();

            let token = CancellationToken::new();
            state.probe_cancel = Some(token.clone());
            (state.generation, token)
        };
        self.logger.log_stage(Stage::Idle, Stage::Ping).await;

        let ping = match self.measure_ping(&probe_cancel).await {
            Ok(Some(ping)) => ping,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.abandon(generation);
                return Err(e);
            }
        };

        if !self.advance(generation, Stage::Download, |state| state.results.ping = Some(ping)) {
            return Ok(None);
        }
        self.logger.log_stage(Stage::Ping, Stage::Download).await;

        let download = match self.measure_throughput(Direction::Download, generation).await {
            Ok(Some(download)) => download,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.abandon(generation);
                return Err(e);
            }
        };
        if !self.advance(generation, Stage::Upload, |state| state.results.download = Some(download)) {
            return Ok(None);
        }
        self.logger.log_stage(Stage::Download, Stage::Upload).await;

        let upload = match self.measure_throughput(Direction::Upload, generation).await {
            Ok(Some(upload)) => upload,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.abandon(generation);
                return Err(e);
            }
        };
        if !self.advance(generation, Stage::Completed, |state| {
            state.results.upload = Some(upload);
            state.progress = 100.0;
        }) {
            return Ok(None);
        }
        self.logger.log_stage(Stage::Upload, Stage::Completed).await;

        Ok(Some(self.results()))
    }

    /// Cancel whatever is running and return to [`Stage::Idle`].
    ///
    /// Results of the last session are kept until the next `start`.
    pub fn reset(&self) {
        let mut state = lock(&self.state);

        if let Some(token) = state.probe_cancel.take() {
            token.cancel();
        }
        if let Some(handle) = state.active.take() {
            handle.cancel();
        }

        state.generation += 1;
        state.stage = Stage::Idle;
        state.progress = 0.0;
        state.current_speed = 0.0;
    }

    async fn measure_ping(&self, cancel: &CancellationToken) -> Result<Option<Reading>> {
        let probe = LatencyProbe::new(self.transport.clone(), self.config.latency.clone())?
            .with_fallback(self.fallback.clone())
            .with_logger(self.logger.clone());

        match probe.run(cancel).await {
            LatencyOutcome::Cancelled => Ok(None),
            LatencyOutcome::Failed => {
                // The sequence always continues with a tagged synthetic ping
                let millis = probe.synthesize("latency probe failed").await?;
                Ok(Some(Reading::synthetic(f64::from(millis))))
            }
            outcome => Ok(outcome.reading()),
        }
    }

    async fn measure_throughput(&self, direction: Direction, generation: u64) -> Result<Option<Reading>> {
        let config = self.config.throughput(direction).clone();
        let mut test = ThroughputTest::new(direction, self.transport.clone(), config)?
            .with_fallback(self.fallback.clone())
            .with_logger(self.logger.clone());
        if let Some(selector) = &self.selector {
            test = test.with_selector(selector.clone());
        }

        let controller = test.start(self.stage_callbacks(direction, generation));
        {
            let mut state = lock(&self.state);
            if state.generation != generation {
                controller.cancel();
                return Ok(None);
            }
            state.active = Some(controller.cancel_handle());
        }

        let outcome = controller.wait().await;

        let mut state = lock(&self.state);
        if state.generation != generation {
            return Ok(None);
        }
        state.active = None;

        match outcome {
            Some(outcome) => Ok(Some(outcome.reading())),
            None => Err(AppError::internal(format!("{} run ended without a result", direction))),
        }
    }

    /// Callbacks that write into the session only while it is `generation`
    fn stage_callbacks(&self, direction: Direction, generation: u64) -> ThroughputCallbacks {
        let on_speed = {
            let state = self.state.clone();
            move |mbps: f64| {
                let mut state = lock(&state);
                if state.generation == generation {
                    state.current_speed = mbps;
                }
            }
        };
        let on_progress = {
            let state = self.state.clone();
            move |percent: f64| {
                let mut state = lock(&state);
                if state.generation == generation {
                    state.progress = percent;
                }
            }
        };
        let on_data_point = {
            let state = self.state.clone();
            move |sample: &Sample| {
                let mut state = lock(&state);
                if state.generation == generation {
                    state.samples_mut(direction).push(*sample);
                }
            }
        };
        let on_complete = {
            let state = self.state.clone();
            move |mbps: f64| {
                let mut state = lock(&state);
                if state.generation == generation {
                    state.current_speed = mbps;
                }
            }
        };

        ThroughputCallbacks::new()
            .on_speed(on_speed)
            .on_progress(on_progress)
            .on_data_point(on_data_point)
            .on_complete(on_complete)
    }

    /// Apply `update` and move to `next` if the session is still current
    fn advance(&self, generation: u64, next: Stage, update: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = lock(&self.state);
        if state.generation != generation {
            return false;
        }

        update(&mut state);
        state.stage = next;
        if next != Stage::Completed {
            state.progress = 0.0;
            state.current_speed = 0.0;
        }
        state.probe_cancel = None;
        true
    }

    /// Return to idle after an error, unless a reset already did
    fn abandon(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.generation == generation {
            state.stage = Stage::Idle;
            state.probe_cancel = None;
            state.active = None;
        }
    }
}
