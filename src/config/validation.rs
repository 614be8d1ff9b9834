//! Non-fatal configuration checks
//!
//! `Config::validate` rejects configurations the engine cannot run. The
//! checks here flag configurations that will run but are likely to produce
//! poor measurements.

use crate::{
    error::Result,
    models::{Config, Direction, DistributionBucket, LatencyConfig, ThroughputConfig},
};
use colored::Colorize;

/// Configuration validator with advisory rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Run `Config::validate`, then collect advisory warnings
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_latency(&config.latency));
        warnings.extend(Self::validate_throughput(&config.download, Direction::Download));
        warnings.extend(Self::validate_throughput(&config.upload, Direction::Upload));

        Ok(warnings)
    }

    fn validate_endpoints(label: &str, endpoints: &[String]) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        for endpoint in endpoints {
            let Ok(parsed) = url::Url::parse(endpoint) else {
                continue;
            };

            if parsed.scheme() == "http" {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("{} endpoint '{}' uses plain HTTP; proxies may cache or rewrite it", label, endpoint),
                ));
            }

            let local = match parsed.host() {
                Some(url::Host::Ipv4(ip)) => ip.is_private() || ip.is_loopback(),
                Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
                Some(url::Host::Domain(domain)) => domain == "localhost",
                None => false,
            };
            if local {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    format!(
                        "{} endpoint '{}' targets a local network; results will not reflect the internet link",
                        label, endpoint
                    ),
                ));
            }
        }

        warnings
    }

    fn validate_latency(latency: &LatencyConfig) -> Vec<ValidationWarning> {
        let mut warnings = Self::validate_endpoints("Latency", &latency.endpoints);

        if latency.endpoints.len() < 3 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Only {} latency endpoint(s); the median is less robust against one slow host",
                    latency.endpoints.len()
                ),
            ));
        }

        if latency.endpoint_timeout_ms >= latency.timeout_ms {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Per-endpoint timeout ({}ms) is not below the overall probe timeout ({}ms); \
                     slow endpoints will fail the whole probe",
                    latency.endpoint_timeout_ms, latency.timeout_ms
                ),
            ));
        }

        if (latency.endpoint_timeout_ms as f64) > latency.max_acceptable_ms {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "Endpoints recorded at the timeout ({}ms) fall outside the acceptable band and will be discarded",
                    latency.endpoint_timeout_ms
                ),
            ));
        }

        warnings.extend(Self::validate_buckets("Latency", &latency.fallback_buckets));
        warnings
    }

    fn validate_throughput(throughput: &ThroughputConfig, direction: Direction) -> Vec<ValidationWarning> {
        let label = direction.to_string();
        let mut warnings = Self::validate_endpoints(&label, &throughput.endpoints);

        if throughput.duration_ms < 3000 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} duration of {}ms is short; expect few samples and a likely fallback",
                    label, throughput.duration_ms
                ),
            ));
        }

        if throughput.transfer_timeout_ms > throughput.duration_ms {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!(
                    "{} transfer timeout ({}ms) exceeds the run duration; the run deadline bounds transfers instead",
                    label, throughput.transfer_timeout_ms
                ),
            ));
        }

        if direction == Direction::Download && throughput.concurrency > 1 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Download concurrency {} is not supported; downloads run one transfer at a time",
                    throughput.concurrency
                ),
            ));
        }

        if direction == Direction::Upload && throughput.payload_sizes.iter().any(|&size| size > 16 * 1024 * 1024) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("{} payloads above 16 MB are held in memory for the whole run", label),
            ));
        }

        warnings.extend(Self::validate_buckets(&label, &throughput.fallback_buckets));
        warnings
    }

    fn validate_buckets(label: &str, buckets: &[DistributionBucket]) -> Vec<ValidationWarning> {
        let total: f64 = buckets.iter().map(|b| b.probability).sum();
        if (total - 1.0).abs() > 0.01 {
            vec![ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} fallback probabilities sum to {:.2}; the last bucket absorbs the remainder",
                    label, total
                ),
            )]
        } else {
            Vec::new()
        }
    }
}

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Validation warning with severity
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = self.level.as_str();
        if use_color {
            let tag = match self.level {
                ValidationLevel::Info => tag.blue(),
                ValidationLevel::Warning => tag.yellow(),
                ValidationLevel::Error => tag.red().bold(),
            };
            format!("[{}] {}", tag, self.message)
        } else {
            format!("[{}] {}", tag, self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
