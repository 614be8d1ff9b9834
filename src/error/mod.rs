//! Error handling for the measurement engine

use thiserror::Error;

/// Custom error types for the measurement engine
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (URLs, JSON, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Statistics calculation errors
    #[error("Statistics error: {0}")]
    Statistics(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    /// Create a new HTTP request error
    pub fn http_request<S: Into<String>>(message: S) -> Self {
        Self::HttpRequest(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new statistics error
    pub fn statistics<S: Into<String>>(message: S) -> Self {
        Self::Statistics(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Network(_) => "NETWORK",
            Self::HttpRequest(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Statistics(_) => "STATS",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Transient per-operation failures: a run counts them and moves on
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::HttpRequest(_) | Self::Timeout(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => false,
            Self::Io(_) | Self::Statistics(_) | Self::Internal(_) => false,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        let (summary, msg, advice) = match self {
            Self::Config(msg) => (
                "Configuration problem",
                msg,
                "Suggestion: Check your .env file or SPEEDTEST_* environment variables.",
            ),
            Self::Network(msg) => (
                "Network connectivity issue",
                msg,
                "Suggestion: Check your internet connection and try again.",
            ),
            Self::HttpRequest(msg) => (
                "HTTP request failed",
                msg,
                "Suggestion: The measurement endpoint may be down or rejecting requests. \
                 Try a different endpoint pool.",
            ),
            Self::Timeout(msg) => (
                "Request timed out",
                msg,
                "Suggestion: Increase the transfer or probe timeout, or check your network connection.",
            ),
            Self::Validation(msg) => (
                "Invalid input",
                msg,
                "Suggestion: Check the endpoint URLs, durations and bands in your configuration.",
            ),
            Self::Io(msg) => (
                "File operation failed",
                msg,
                "Suggestion: Check file permissions and disk space.",
            ),
            Self::Parse(msg) => (
                "Failed to parse data",
                msg,
                "Suggestion: Check the format of your input data or configuration files.",
            ),
            Self::Statistics(msg) => (
                "Statistics calculation failed",
                msg,
                "Suggestion: This usually means no usable samples were collected.",
            ),
            Self::Internal(msg) => (
                "Internal error",
                msg,
                "This is likely a bug. Please report this issue with the error details.",
            ),
        };

        format!("{}: {}\n\n{}", summary, msg, advice)
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Network(_) | Self::HttpRequest(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Timeout(_) => {
                    format!("[{}] {}", category.blue().bold(), message.blue())
                }
                Self::Io(_) | Self::Statistics(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::network(error.to_string())
        } else {
            Self::http_request(error.to_string())
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::str::ParseBoolError> for AppError {
    fn from(error: std::str::ParseBoolError) -> Self {
        Self::parse(format!("Boolean parse error: {}", error))
    }
}

/// Custom Result type for the crate
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Add static context to an error
    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let original_error = e.into();
            let context = f();
            // Keep the category of the original error so callers can still
            // branch on is_recoverable()
            match original_error {
                AppError::Config(msg) => AppError::Config(format!("{}: {}", context, msg)),
                AppError::Network(msg) => AppError::Network(format!("{}: {}", context, msg)),
                AppError::HttpRequest(msg) => AppError::HttpRequest(format!("{}: {}", context, msg)),
                AppError::Timeout(msg) => AppError::Timeout(format!("{}: {}", context, msg)),
                AppError::Validation(msg) => AppError::Validation(format!("{}: {}", context, msg)),
                AppError::Io(msg) => AppError::Io(format!("{}: {}", context, msg)),
                AppError::Parse(msg) => AppError::Parse(format!("{}: {}", context, msg)),
                AppError::Statistics(msg) => AppError::Statistics(format!("{}: {}", context, msg)),
                AppError::Internal(msg) => AppError::Internal(format!("{}: {}", context, msg)),
            }
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = AppError::config("Invalid configuration");
        assert!(matches!(config_err, AppError::Config(_)));
        assert_eq!(config_err.category(), "CONFIG");
        assert!(!config_err.is_recoverable());

        let network_err = AppError::network("Connection failed");
        assert!(matches!(network_err, AppError::Network(_)));
        assert_eq!(network_err.category(), "NETWORK");
        assert!(network_err.is_recoverable());
    }

    #[test]
    fn test_transient_errors_are_recoverable() {
        assert!(AppError::timeout("probe").is_recoverable());
        assert!(AppError::http_request("503").is_recoverable());
        assert!(!AppError::statistics("empty").is_recoverable());
        assert!(!AppError::validation("bad").is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let error = AppError::timeout("Transfer timed out after 5s");
        assert_eq!(error.to_string(), "Timeout error: Transfer timed out after 5s");
    }

    #[test]
    fn test_user_friendly_messages() {
        let error = AppError::config("no endpoints");
        let message = error.user_friendly_message();
        assert!(message.contains("Configuration problem"));
        assert!(message.contains("SPEEDTEST_"));
    }

    #[test]
    fn test_console_formatting() {
        let error = AppError::network("Test error");
        let plain = error.format_for_console(false);
        assert_eq!(plain, "[NETWORK] Network error: Test error");

        let colored = error.format_for_console(true);
        assert!(colored.contains("NETWORK"));
    }

    #[test]
    fn test_error_conversions() {
        let url_err: AppError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(url_err, AppError::Parse(_)));

        let int_err: AppError = "abc".parse::<u32>().unwrap_err().into();
        assert!(matches!(int_err, AppError::Parse(_)));

        let io_err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(io_err, AppError::Io(_)));
    }

    #[test]
    fn test_error_context_keeps_category() {
        let result: std::result::Result<(), AppError> = Err(AppError::timeout("slow"));
        let err = result.context("Download transfer").unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
        assert!(err.to_string().contains("Download transfer: slow"));
    }
}
