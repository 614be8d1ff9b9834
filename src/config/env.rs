//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

/// Value shape of a supported variable
#[derive(Debug, Clone, Copy)]
enum VarKind {
    UrlList,
    Millis { max: u64 },
    Count { max: u64 },
    Factor,
    Flag,
}

const SUPPORTED_VARS: &[(&str, VarKind, &str, &str)] = &[
    (
        "SPEEDTEST_PING_ENDPOINTS",
        VarKind::UrlList,
        "Comma-separated latency probe endpoints",
        "https://www.google.com,https://www.cloudflare.com",
    ),
    ("SPEEDTEST_PING_TIMEOUT_MS", VarKind::Millis { max: 60_000 }, "Overall latency probe timeout in ms", "5000"),
    ("SPEEDTEST_PING_ENDPOINT_TIMEOUT_MS", VarKind::Millis { max: 60_000 }, "Per-endpoint probe timeout in ms", "1500"),
    ("SPEEDTEST_PING_CORRECTION_FACTOR", VarKind::Factor, "Multiplier applied to the median RTT (0-2]", "0.85"),
    ("SPEEDTEST_PING_FALLBACK", VarKind::Flag, "Report a synthetic latency when probing fails", "false"),
    (
        "SPEEDTEST_DOWNLOAD_URLS",
        VarKind::UrlList,
        "Comma-separated download file URLs",
        "https://speed.cloudflare.com/__down?bytes=1000000",
    ),
    (
        "SPEEDTEST_UPLOAD_URLS",
        VarKind::UrlList,
        "Comma-separated endpoints accepting POST bodies",
        "https://httpbin.org/post",
    ),
    ("SPEEDTEST_DURATION_MS", VarKind::Millis { max: 600_000 }, "Throughput run budget in ms", "10000"),
    ("SPEEDTEST_UPDATE_INTERVAL_MS", VarKind::Millis { max: 10_000 }, "Download speed recompute cadence in ms", "200"),
    ("SPEEDTEST_TRANSFER_TIMEOUT_MS", VarKind::Millis { max: 120_000 }, "Per-transfer timeout in ms", "5000"),
    ("SPEEDTEST_MAX_FAILED_ATTEMPTS", VarKind::Count { max: 1000 }, "Failed transfers before a run gives up", "8"),
    ("SPEEDTEST_UPLOAD_CONCURRENCY", VarKind::Count { max: 16 }, "Parallel uploads per tick (1-16)", "3"),
    ("SPEEDTEST_ENABLE_COLOR", VarKind::Flag, "Enable colored log output", "true"),
    ("SPEEDTEST_VERBOSE", VarKind::Flag, "Log stage transitions and aggregates", "false"),
    ("SPEEDTEST_DEBUG", VarKind::Flag, "Log every probe and transfer as JSON", "false"),
];

impl EnvManager {
    /// Load an env file. With no explicit path, `.env` in the working
    /// directory is loaded if present. Existing variables are not overridden.
    pub fn load_env_file(path: Option<&Path>, debug: bool) -> Result<()> {
        let path = path.unwrap_or_else(|| Path::new(".env"));

        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;

            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No env file at {}, using defaults and environment", path.display());
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        let mut content = String::from(
            "# Speed Probe Configuration\n\
             #\n\
             # Values here are loaded before the process environment is read;\n\
             # variables already set in the environment take precedence.\n\n",
        );

        for (name, _, description, example) in SUPPORTED_VARS {
            content.push_str(&format!("# {}\n# {}={}\n\n", description, name, example));
        }

        content.push_str(
            "# Example: short smoke test against a first-party endpoint set\n\
             # SPEEDTEST_DOWNLOAD_URLS=https://speed.example.net/10mb.bin\n\
             # SPEEDTEST_UPLOAD_URLS=https://speed.example.net/upload\n\
             # SPEEDTEST_DURATION_MS=3000\n",
        );

        content
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        let content = Self::create_example_env_content();
        std::fs::write(path, content)
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))?;

        Ok(())
    }

    /// Validate environment variable format before parsing. Unknown keys are ignored.
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let Some((_, kind, _, _)) = SUPPORTED_VARS.iter().find(|(name, ..)| *name == key) else {
            return Ok(());
        };

        match *kind {
            VarKind::UrlList => {
                let mut count = 0;
                for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let parsed = url::Url::parse(entry)
                        .map_err(|e| AppError::config(format!("Invalid {} entry '{}': {}", key, entry, e)))?;
                    if !matches!(parsed.scheme(), "http" | "https") {
                        return Err(AppError::config(format!("{} entry must be http(s): {}", key, entry)));
                    }
                    count += 1;
                }
                if count == 0 {
                    return Err(AppError::config(format!("{} cannot be empty", key)));
                }
            }
            VarKind::Millis { max } | VarKind::Count { max } => {
                let number: u64 = value
                    .trim()
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if number == 0 || number > max {
                    return Err(AppError::config(format!("{} must be between 1 and {}, got: {}", key, max, number)));
                }
            }
            VarKind::Factor => {
                let factor: f64 = value
                    .trim()
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if !(factor > 0.0 && factor <= 2.0) {
                    return Err(AppError::config(format!("{} must be within (0, 2], got: {}", key, factor)));
                }
            }
            VarKind::Flag => {
                value
                    .trim()
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
        }

        Ok(())
    }

    /// Get list of all supported environment variables: (name, description, example)
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        SUPPORTED_VARS
            .iter()
            .map(|(name, _, description, example)| (*name, *description, *example))
            .collect()
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<36} {}\n", var, description));
            help.push_str(&format!("  {:<36} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Process environment variables\n");
        help.push_str("  2. .env file values\n");
        help.push_str("  3. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        for (var_name, _, _) in Self::get_supported_env_vars() {
            if let Ok(value) = std::env::var(var_name) {
                if let Err(e) = Self::validate_env_var(var_name, &value) {
                    warnings.push(format!("Warning: {}", e));
                }
            }
        }

        Ok(warnings)
    }

    /// Validate the lines of an env file without loading it.
    /// Returns `None` when the file does not exist.
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut warnings = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                if let Err(e) = Self::validate_env_var(key.trim(), value.trim()) {
                    warnings.push(format!("Line '{}': {}", line, e));
                }
            }
        }

        Ok(Some(warnings))
    }
}
