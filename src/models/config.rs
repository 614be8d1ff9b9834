//! Configuration data model and validation

use crate::error::{AppError, Result};
use crate::models::{Direction, DistributionBucket};
use crate::stats::fallback::validate_buckets;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Latency probe settings
    #[serde(default)]
    pub latency: LatencyConfig,

    /// Download sampler settings
    #[serde(default = "ThroughputConfig::download", deserialize_with = "download_section")]
    pub download: ThroughputConfig,

    /// Upload sampler settings
    #[serde(default = "ThroughputConfig::upload", deserialize_with = "upload_section")]
    pub upload: ThroughputConfig,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latency: LatencyConfig::default(),
            download: ThroughputConfig::download(),
            upload: ThroughputConfig::upload(),
            enable_color: default_enable_color(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Throughput settings for one direction
    pub fn throughput(&self, direction: Direction) -> &ThroughputConfig {
        match direction {
            Direction::Download => &self.download,
            Direction::Upload => &self.upload,
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.latency.validate()?;
        self.download.validate(Direction::Download)?;
        self.upload.validate(Direction::Upload)?;
        Ok(())
    }

    /// Merge `SPEEDTEST_*` environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Some(endpoints) = env_list("SPEEDTEST_PING_ENDPOINTS") {
            self.latency.endpoints = endpoints;
        }
        if let Some(value) = env_parsed::<u64>("SPEEDTEST_PING_TIMEOUT_MS")? {
            self.latency.timeout_ms = value;
        }
        if let Some(value) = env_parsed::<u64>("SPEEDTEST_PING_ENDPOINT_TIMEOUT_MS")? {
            self.latency.endpoint_timeout_ms = value;
        }
        if let Some(value) = env_parsed::<f64>("SPEEDTEST_PING_CORRECTION_FACTOR")? {
            self.latency.correction_factor = value;
        }
        if let Some(value) = env_parsed::<bool>("SPEEDTEST_PING_FALLBACK")? {
            self.latency.fallback_on_failure = value;
        }

        if let Some(endpoints) = env_list("SPEEDTEST_DOWNLOAD_URLS") {
            self.download.endpoints = endpoints;
        }
        if let Some(endpoints) = env_list("SPEEDTEST_UPLOAD_URLS") {
            self.upload.endpoints = endpoints;
        }
        if let Some(value) = env_parsed::<usize>("SPEEDTEST_UPLOAD_CONCURRENCY")? {
            self.upload.concurrency = value;
        }

        // Shared by both directions
        for throughput in [&mut self.download, &mut self.upload] {
            if let Some(value) = env_parsed::<u64>("SPEEDTEST_DURATION_MS")? {
                throughput.duration_ms = value;
            }
            if let Some(value) = env_parsed::<u64>("SPEEDTEST_UPDATE_INTERVAL_MS")? {
                throughput.update_interval_ms = value;
            }
            if let Some(value) = env_parsed::<u64>("SPEEDTEST_TRANSFER_TIMEOUT_MS")? {
                throughput.transfer_timeout_ms = value;
            }
            if let Some(value) = env_parsed::<u32>("SPEEDTEST_MAX_FAILED_ATTEMPTS")? {
                throughput.max_failed_attempts = value;
            }
        }

        if let Some(value) = env_parsed::<bool>("SPEEDTEST_ENABLE_COLOR")? {
            self.enable_color = value;
        }
        if let Some(value) = env_parsed::<bool>("SPEEDTEST_VERBOSE")? {
            self.verbose = value;
        }
        if let Some(value) = env_parsed::<bool>("SPEEDTEST_DEBUG")? {
            self.debug = value;
        }

        Ok(())
    }
}

/// Latency probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub endpoints: Vec<String>,
    /// Bound on the whole probe
    pub timeout_ms: u64,
    /// Bound on a single endpoint; a slower endpoint is recorded at this value
    pub endpoint_timeout_ms: u64,
    pub min_acceptable_ms: f64,
    pub max_acceptable_ms: f64,
    /// Compensates request overhead over true network RTT
    pub correction_factor: f64,
    /// Report a synthetic latency instead of failing
    pub fallback_on_failure: bool,
    pub fallback_buckets: Vec<DistributionBucket>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        use crate::defaults::*;
        Self {
            endpoints: to_strings(DEFAULT_PING_ENDPOINTS),
            timeout_ms: DEFAULT_PING_TIMEOUT.as_millis() as u64,
            endpoint_timeout_ms: DEFAULT_ENDPOINT_TIMEOUT.as_millis() as u64,
            min_acceptable_ms: DEFAULT_MIN_LATENCY_MS,
            max_acceptable_ms: DEFAULT_MAX_LATENCY_MS,
            correction_factor: DEFAULT_CORRECTION_FACTOR,
            fallback_on_failure: false,
            fallback_buckets: DistributionBucket::from_table(LATENCY_FALLBACK_BUCKETS),
        }
    }
}

impl LatencyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_endpoints("latency", &self.endpoints)?;

        if self.timeout_ms == 0 {
            return Err(AppError::config("Latency timeout must be greater than 0"));
        }
        if self.endpoint_timeout_ms == 0 {
            return Err(AppError::config("Per-endpoint latency timeout must be greater than 0"));
        }
        if !self.min_acceptable_ms.is_finite()
            || !self.max_acceptable_ms.is_finite()
            || self.min_acceptable_ms < 0.0
            || self.min_acceptable_ms > self.max_acceptable_ms
        {
            return Err(AppError::config(format!(
                "Invalid acceptable latency band [{}, {}]",
                self.min_acceptable_ms, self.max_acceptable_ms
            )));
        }
        if !self.correction_factor.is_finite() || self.correction_factor <= 0.0 {
            return Err(AppError::config(format!(
                "Correction factor must be positive, got {}",
                self.correction_factor
            )));
        }
        validate_buckets(&self.fallback_buckets)?;

        Ok(())
    }
}

/// Throughput sampler settings for one direction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThroughputConfig {
    pub endpoints: Vec<String>,
    /// Run budget
    pub duration_ms: u64,
    /// Download speed recompute cadence
    pub update_interval_ms: u64,
    pub transfer_timeout_ms: u64,
    /// Gap between consecutive transfers
    pub pause_ms: u64,
    pub max_failed_attempts: u32,
    pub min_speed_mbps: f64,
    pub max_speed_mbps: f64,
    /// Fewer real samples than this and the run falls back
    pub min_real_samples: usize,
    pub aggregate_percentile: f64,
    pub degraded_factor: f64,
    pub backfill_points: usize,
    /// Transfers per tick
    pub concurrency: usize,
    /// Upload payload pool, bytes
    pub payload_sizes: Vec<usize>,
    pub fallback_buckets: Vec<DistributionBucket>,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self::download()
    }
}

impl ThroughputConfig {
    /// Download defaults
    pub fn download() -> Self {
        use crate::defaults::*;
        Self {
            endpoints: to_strings(DEFAULT_DOWNLOAD_URLS),
            duration_ms: DEFAULT_TEST_DURATION.as_millis() as u64,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL.as_millis() as u64,
            transfer_timeout_ms: DEFAULT_TRANSFER_TIMEOUT.as_millis() as u64,
            pause_ms: DEFAULT_TRANSFER_PAUSE.as_millis() as u64,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            min_speed_mbps: DEFAULT_MIN_SPEED_MBPS,
            max_speed_mbps: DEFAULT_MAX_SPEED_MBPS,
            min_real_samples: DEFAULT_MIN_REAL_SAMPLES,
            aggregate_percentile: DEFAULT_AGGREGATE_PERCENTILE,
            degraded_factor: DEFAULT_DEGRADED_FACTOR,
            backfill_points: DEFAULT_BACKFILL_POINTS,
            concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            payload_sizes: Vec::new(),
            fallback_buckets: DistributionBucket::from_table(DOWNLOAD_FALLBACK_BUCKETS),
        }
    }

    /// Upload defaults
    pub fn upload() -> Self {
        use crate::defaults::*;
        Self {
            endpoints: to_strings(DEFAULT_UPLOAD_URLS),
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            payload_sizes: DEFAULT_UPLOAD_PAYLOAD_SIZES.to_vec(),
            fallback_buckets: DistributionBucket::from_table(UPLOAD_FALLBACK_BUCKETS),
            ..Self::download()
        }
    }

    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Download => Self::download(),
            Direction::Upload => Self::upload(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    /// Whether a computed speed passes the sanity band
    pub fn accepts_speed(&self, mbps: f64) -> bool {
        mbps.is_finite() && mbps >= self.min_speed_mbps && mbps <= self.max_speed_mbps
    }

    pub fn validate(&self, direction: Direction) -> Result<()> {
        validate_endpoints(direction.as_str(), &self.endpoints)?;

        if self.duration_ms == 0 {
            return Err(AppError::config(format!("{} duration must be greater than 0", direction)));
        }
        if self.update_interval_ms == 0 {
            return Err(AppError::config(format!("{} update interval must be greater than 0", direction)));
        }
        if self.transfer_timeout_ms == 0 {
            return Err(AppError::config(format!("{} transfer timeout must be greater than 0", direction)));
        }
        if self.max_failed_attempts == 0 {
            return Err(AppError::config(format!("{} max failed attempts must be at least 1", direction)));
        }
        if !self.min_speed_mbps.is_finite()
            || !self.max_speed_mbps.is_finite()
            || self.min_speed_mbps < 0.0
            || self.min_speed_mbps >= self.max_speed_mbps
        {
            return Err(AppError::config(format!(
                "Invalid {} speed band [{}, {}]",
                direction.as_str(),
                self.min_speed_mbps,
                self.max_speed_mbps
            )));
        }
        if self.min_real_samples == 0 {
            return Err(AppError::config("Minimum real samples must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.aggregate_percentile) {
            return Err(AppError::config(format!(
                "Aggregate percentile must be within [0, 1], got {}",
                self.aggregate_percentile
            )));
        }
        if !(self.degraded_factor > 0.0 && self.degraded_factor <= 1.0) {
            return Err(AppError::config(format!(
                "Degraded factor must be within (0, 1], got {}",
                self.degraded_factor
            )));
        }
        if self.concurrency == 0 {
            return Err(AppError::config(format!("{} concurrency must be at least 1", direction)));
        }
        if direction == Direction::Upload {
            if self.payload_sizes.is_empty() {
                return Err(AppError::config("Upload payload pool cannot be empty"));
            }
            if self.payload_sizes.contains(&0) {
                return Err(AppError::config("Upload payload sizes must be greater than 0"));
            }
        }
        validate_buckets(&self.fallback_buckets)?;

        Ok(())
    }
}

/// A throughput section as written in a config file. Absent fields keep the
/// defaults of the direction the section belongs to.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThroughputSection {
    endpoints: Option<Vec<String>>,
    duration_ms: Option<u64>,
    update_interval_ms: Option<u64>,
    transfer_timeout_ms: Option<u64>,
    pause_ms: Option<u64>,
    max_failed_attempts: Option<u32>,
    min_speed_mbps: Option<f64>,
    max_speed_mbps: Option<f64>,
    min_real_samples: Option<usize>,
    aggregate_percentile: Option<f64>,
    degraded_factor: Option<f64>,
    backfill_points: Option<usize>,
    concurrency: Option<usize>,
    payload_sizes: Option<Vec<usize>>,
    fallback_buckets: Option<Vec<DistributionBucket>>,
}

impl ThroughputSection {
    fn overlay(self, mut base: ThroughputConfig) -> ThroughputConfig {
        macro_rules! overlay {
            ($section:ident => $target:ident: $($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = $section.$field {
                        $target.$field = value;
                    }
                )*
            };
        }

        let section = self;
        overlay!(
            section => base:
            endpoints,
            duration_ms,
            update_interval_ms,
            transfer_timeout_ms,
            pause_ms,
            max_failed_attempts,
            min_speed_mbps,
            max_speed_mbps,
            min_real_samples,
            aggregate_percentile,
            degraded_factor,
            backfill_points,
            concurrency,
            payload_sizes,
            fallback_buckets,
        );
        base
    }
}

fn download_section<'de, D>(deserializer: D) -> std::result::Result<ThroughputConfig, D::Error>
where
    D: Deserializer<'de>,
{
    ThroughputSection::deserialize(deserializer)
        .map(|section| section.overlay(ThroughputConfig::download()))
}

fn upload_section<'de, D>(deserializer: D) -> std::result::Result<ThroughputConfig, D::Error>
where
    D: Deserializer<'de>,
{
    ThroughputSection::deserialize(deserializer)
        .map(|section| section.overlay(ThroughputConfig::upload()))
}

fn validate_endpoints(label: &str, endpoints: &[String]) -> Result<()> {
    if endpoints.is_empty() {
        return Err(AppError::config(format!("The {} endpoint list cannot be empty", label)));
    }

    for endpoint in endpoints {
        if endpoint.is_empty() {
            return Err(AppError::config(format!("{} endpoint URL cannot be empty", label)));
        }

        match url::Url::parse(endpoint) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(AppError::config(format!(
                    "Unsupported scheme '{}' in {} endpoint {}",
                    parsed.scheme(),
                    label,
                    endpoint
                )));
            }
            Err(e) => {
                return Err(AppError::config(format!("Invalid {} endpoint '{}': {}", label, endpoint, e)));
            }
        }
    }

    Ok(())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|value| {
        value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn env_parsed<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e))),
        Err(_) => Ok(None),
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|&s| s.to_string()).collect()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
