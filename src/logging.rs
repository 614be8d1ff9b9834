//! Structured logging for the measurement engine
//!
//! This module provides:
//! - Structured logging with multiple levels and shared context fields
//! - Per-session and per-operation correlation IDs
//! - Console, JSON and compact output formats
//! - A measurement logger for probe, transfer, fallback and stage events

use crate::error::{AppError, Result};
use crate::models::{Config, Direction, Sample, Stage};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - per-chunk and per-window detail
    Trace = 0,
    /// Debug level - individual transfers and probes
    Debug = 1,
    /// Info level - stage transitions and aggregates
    Info = 2,
    /// Warning level - synthetic values and degraded runs
    Warn = 3,
    /// Error level - failures that abort a run
    Error = 4,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Padded, colored level tag for console output
    fn colored_tag(&self) -> String {
        let padded = format!("{:>5}", self.as_str());
        match self {
            LogLevel::Trace => padded.white().to_string(),
            LogLevel::Debug => padded.cyan().to_string(),
            LogLevel::Info => padded.green().to_string(),
            LogLevel::Warn => padded.yellow().bold().to_string(),
            LogLevel::Error => padded.red().bold().to_string(),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Logger name/component
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    pub fields: HashMap<String, serde_json::Value>,
    pub location: Option<LogLocation>,
}

/// Source code location information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLocation {
    pub file: String,
    pub line: u32,
    pub module: Option<String>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

/// Shared logging context for correlation and session tracking
#[derive(Debug, Default)]
struct LogContext {
    session_id: Option<String>,
    current_correlation_id: Option<String>,
    context_fields: HashMap<String, serde_json::Value>,
}

/// Logger implementation with multiple output formats
///
/// Clones share the same context, so a session ID set on one clone is seen
/// by every task logging through the others.
#[derive(Debug, Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    include_location: bool,
    format: LogFormat,
    name: String,
    context: Arc<RwLock<LogContext>>,
}

impl Logger {
    /// Create a new logger
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            include_location: false,
            format: LogFormat::Console,
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// Create a logger whose level and format follow the verbosity flags
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };

        Self {
            min_level,
            use_color: config.enable_color,
            include_location: config.debug,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    pub fn set_color(&mut self, use_color: bool) {
        self.use_color = use_color;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set session correlation ID
    pub async fn set_session_id(&self, session_id: String) {
        let mut context = self.context.write().await;
        context.session_id = Some(session_id);
    }

    /// Add context field for all subsequent log entries
    pub async fn add_context_field<T: Serialize>(&self, key: String, value: T) {
        if let Ok(json_value) = serde_json::to_value(value) {
            let mut context = self.context.write().await;
            context.context_fields.insert(key, json_value);
        }
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.debug(&format!("Started operation: {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "start")
            .log()
            .await;

        correlation_id
    }

    /// End a correlated operation
    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.debug(&format!("Completed operation: {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "end")
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn trace(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if !self.would_log(entry.level) {
            return;
        }

        let context = self.context.read().await;
        if let Some(session_id) = &context.session_id {
            entry.fields.insert("session_id".to_string(), serde_json::Value::String(session_id.clone()));
        }
        if entry.correlation_id.is_none() {
            entry.correlation_id = context.current_correlation_id.clone();
        }
        for (key, value) in &context.context_fields {
            entry.fields.entry(key.clone()).or_insert_with(|| value.clone());
        }
        drop(context);

        let output = match self.format {
            LogFormat::Console => self.format_console(&entry),
            LogFormat::Json => self.format_json(&entry),
            LogFormat::Compact => self.format_compact(&entry),
        };

        // Warnings and errors go to stderr so library consumers can keep stdout clean
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", output);
        } else {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");

        let formatted_level = if self.use_color {
            entry.level.colored_tag()
        } else {
            format!("{:>5}", entry.level.as_str())
        };

        let mut output = format!("{} {} [{}] {}", timestamp, formatted_level, entry.logger, entry.message);

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            fields.sort();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        if self.include_location {
            if let Some(location) = &entry.location {
                output.push_str(&format!(" @ {}:{}", location.file, location.line));
            }
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => serde_json::json!({
                "error": "Failed to serialize log entry",
                "message": entry.message,
            })
            .to_string(),
        }
    }

    fn format_compact(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S");
        format!(
            "{} {} {}: {}",
            timestamp,
            entry.level.as_str().chars().next().unwrap_or('?'),
            entry.logger,
            entry.message
        )
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
                location: None,
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    pub fn location(mut self, file: &str, line: u32, module: Option<&str>) -> Self {
        self.entry.location = Some(LogLocation {
            file: file.to_string(),
            line,
            module: module.map(String::from),
        });
        self
    }

    /// Attach the fields of one throughput sample
    pub fn sample(self, sample: &Sample) -> Self {
        self.field("sample_time_s", sample.time)
            .field("sample_mbps", sample.value)
            .field("sample_origin", sample.origin)
    }

    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable())
            .field("error", error.to_string())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Logger for measurement events: probes, transfers, fallbacks and stages
#[derive(Debug, Clone)]
pub struct MeasurementLogger {
    logger: Logger,
}

impl MeasurementLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("MEASURE".to_string(), config),
        }
    }

    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    /// Access the underlying logger
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Log one latency probe. `rtt_ms` is `None` when the endpoint gave no reply.
    pub async fn log_probe(&self, url: &str, rtt_ms: Option<f64>, error: Option<&AppError>) {
        match (rtt_ms, error) {
            (Some(rtt), _) => {
                self.logger
                    .debug(&format!("Probe {} answered in {:.1}ms", url, rtt))
                    .field("url", url)
                    .field("rtt_ms", rtt)
                    .log()
                    .await;
            }
            (None, Some(err)) => {
                self.logger
                    .debug(&format!("Probe {} failed", url))
                    .field("url", url)
                    .error_info(err)
                    .log()
                    .await;
            }
            (None, None) => {
                crate::log_debug!(self.logger, "Probe {} dropped", url);
            }
        }
    }

    /// Log one completed transfer
    pub async fn log_transfer(
        &self,
        direction: Direction,
        url: &str,
        bytes: u64,
        elapsed_ms: f64,
        mbps: Option<f64>,
    ) {
        let speed = match mbps {
            Some(speed) => format!("{:.2} Mbps", speed),
            None => "rejected".to_string(),
        };
        let message = format!("{} {} bytes from {} in {:.1}ms ({})", direction, bytes, url, elapsed_ms, speed);

        self.logger
            .debug(&message)
            .field("direction", direction)
            .field("url", url)
            .field("bytes", bytes)
            .field("elapsed_ms", elapsed_ms)
            .field("mbps", mbps)
            .log()
            .await;
    }

    /// Log a failed transfer attempt
    pub async fn log_transfer_failure(&self, direction: Direction, url: &str, error: &AppError, failed_attempts: u32) {
        self.logger
            .info(&format!("{} transfer to {} failed (attempt {})", direction, url, failed_attempts))
            .field("direction", direction)
            .field("url", url)
            .field("failed_attempts", failed_attempts)
            .error_info(error)
            .log()
            .await;
    }

    /// Log a substituted synthetic value. Always at WARN so it is never silent.
    pub async fn log_fallback(&self, metric: &str, value: f64, reason: &str) {
        self.logger
            .warn(&format!("Using synthetic {} value {:.2}: {}", metric, value, reason))
            .field("metric", metric)
            .field("synthetic_value", value)
            .field("reason", reason)
            .log()
            .await;
    }

    /// Log the final aggregate of a measured run
    pub async fn log_aggregate(&self, direction: Direction, value: f64, measured_samples: usize, failed_attempts: u32) {
        self.logger
            .info(&format!("{} aggregate {:.2} Mbps from {} samples", direction, value, measured_samples))
            .field("direction", direction)
            .field("aggregate_mbps", value)
            .field("measured_samples", measured_samples)
            .field("failed_attempts", failed_attempts)
            .log()
            .await;
    }

    /// Log an orchestrator stage transition
    pub async fn log_stage(&self, from: Stage, to: Stage) {
        self.logger
            .info(&format!("Stage {} -> {}", from, to))
            .field("from_stage", from)
            .field("to_stage", to)
            .log()
            .await;
    }
}

/// Creates loggers sharing one session ID
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a logger with a specific name
    pub async fn create_logger(&self, name: &str) -> Logger {
        let logger = Logger::with_config(name.to_string(), &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    /// Create a measurement logger tagged with this factory's session
    pub async fn create_measurement_logger(&self) -> MeasurementLogger {
        MeasurementLogger::from_logger(self.create_logger("MEASURE").await)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

/// Convenience macros for logging with location information
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)*) => {
        $logger.error(&format!($($arg)*))
            .location(file!(), line!(), Some(module_path!()))
            .log()
            .await
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleOrigin;
    use std::str::FromStr;

    fn entry(level: LogLevel) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level,
            message: "Test message".to_string(),
            logger: "TEST".to_string(),
            correlation_id: Some("0123456789abcdef".to_string()),
            fields: {
                let mut map = HashMap::new();
                map.insert("key".to_string(), serde_json::Value::String("value".to_string()));
                map
            },
            location: None,
        }
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("fatal").is_err());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_logger_with_config() {
        let config = Config {
            debug: true,
            verbose: true,
            enable_color: false,
            ..Default::default()
        };

        let logger = Logger::with_config("TEST".to_string(), &config);
        assert_eq!(logger.min_level, LogLevel::Debug);
        assert_eq!(logger.format, LogFormat::Json);
        assert!(!logger.use_color);
        assert!(logger.include_location);

        let quiet = Logger::with_config("TEST".to_string(), &Config::default());
        assert_eq!(quiet.min_level, LogLevel::Warn);
        assert!(quiet.would_log(LogLevel::Warn));
        assert!(!quiet.would_log(LogLevel::Info));
    }

    #[tokio::test]
    async fn test_clones_share_context() {
        let logger = Logger::new("TEST".to_string());
        let clone = logger.clone();
        logger.set_session_id("session-1".to_string()).await;
        clone.add_context_field("direction".to_string(), "download").await;

        let context = logger.context.read().await;
        assert_eq!(context.session_id.as_deref(), Some("session-1"));
        assert!(context.context_fields.contains_key("direction"));
    }

    #[tokio::test]
    async fn test_operation_correlation() {
        let logger = Logger::new("TEST".to_string());
        let correlation_id = logger.start_operation("probe").await;
        assert!(!correlation_id.is_empty());
        assert_eq!(
            logger.context.read().await.current_correlation_id.as_deref(),
            Some(correlation_id.as_str())
        );

        logger.end_operation(&correlation_id, "probe", true).await;
        assert!(logger.context.read().await.current_correlation_id.is_none());
    }

    #[test]
    fn test_log_formats() {
        let mut logger = Logger::new("TEST".to_string());
        logger.set_color(false);
        let entry = entry(LogLevel::Info);

        let console_output = logger.format_console(&entry);
        assert!(console_output.contains(" INFO [TEST] Test message"));
        assert!(console_output.contains("[01234567]"));
        assert!(console_output.contains("key=\"value\""));

        let json_output = logger.format_json(&entry);
        let parsed: serde_json::Value = serde_json::from_str(&json_output).unwrap();
        assert_eq!(parsed["level"], "Info");

        let compact_output = logger.format_compact(&entry);
        assert!(compact_output.contains(" I TEST: Test message"));
    }

    #[test]
    fn test_sample_fields() {
        let logger = Logger::new("TEST".to_string());
        let sample = Sample::new(1.5, 42.0, SampleOrigin::Degraded);
        let builder = logger.debug("sample").sample(&sample);
        assert_eq!(builder.entry.fields["sample_mbps"], serde_json::json!(42.0));
        assert_eq!(builder.entry.fields["sample_origin"], serde_json::json!("Degraded"));
    }

    #[test]
    fn test_error_info_fields() {
        let logger = Logger::new("TEST".to_string());
        let builder = logger.warn("failed").error_info(&AppError::timeout("slow"));
        assert_eq!(builder.entry.fields["error_category"], serde_json::json!("TIMEOUT"));
        assert_eq!(builder.entry.fields["error_recoverable"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_measurement_logging() {
        let logger = MeasurementLogger::new(&Config::default());
        assert_eq!(logger.logger().name(), "MEASURE");

        logger.log_probe("https://example.com", Some(23.0), None).await;
        logger.log_probe("https://example.com", None, Some(&AppError::network("refused"))).await;
        logger.log_probe("https://example.com", None, None).await;
        logger.log_transfer(Direction::Download, "https://example.com/1mb", 1_000_000, 80.0, Some(100.0)).await;
        let rejected = AppError::http_request("500");
        logger.log_transfer_failure(Direction::Upload, "https://example.com/up", &rejected, 2).await;
        logger.log_aggregate(Direction::Download, 88.0, 12, 0).await;
        logger.log_stage(Stage::Idle, Stage::Ping).await;
    }

    #[tokio::test]
    async fn test_location_macros() {
        let logger = Logger::new("TEST".to_string());
        let direction = Direction::Upload;

        crate::log_debug!(logger, "{} window closed", direction);
        crate::log_info!(logger, "{} run stopped after {} failed transfers", direction, 3);
        crate::log_warn!(logger, "Latency probe failed: {}", "no endpoint answered");
        crate::log_error!(logger, "{} fallback estimate failed", direction);

        let builder = logger
            .warn("located")
            .location(file!(), line!(), Some(module_path!()));
        let location = builder.entry.location.as_ref().unwrap();
        assert!(location.file.ends_with("logging.rs"));
        assert_eq!(location.module.as_deref(), Some(module_path!()));
    }

    #[tokio::test]
    async fn test_logger_factory() {
        let factory = LoggerFactory::new(Config::default());
        let logger = factory.create_measurement_logger().await;
        assert_eq!(logger.logger().name(), "MEASURE");

        let context = logger.logger().context.read().await;
        assert_eq!(context.session_id.as_deref(), Some(factory.session_id()));
    }
}
