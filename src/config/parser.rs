//! Configuration loading: defaults, env file, environment, validation

use crate::{config::env::EnvManager, error::Result, models::Config};
use std::path::PathBuf;

/// Builds a validated `Config` from defaults, an optional env file and the
/// process environment
#[derive(Debug, Default)]
pub struct ConfigParser {
    env_file: Option<PathBuf>,
    debug: bool,
}

impl ConfigParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read this env file instead of `./.env`
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Report which env file was loaded
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file(self.env_file.as_deref(), self.debug)?;
        config.merge_from_env()?;

        // A debug flag passed to the parser wins over the environment
        if self.debug {
            config.debug = true;
        }

        config.validate()?;

        Ok(config)
    }
}

/// Load configuration from `./.env` and the environment
pub fn load_config() -> Result<Config> {
    ConfigParser::new().parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Ping Endpoints: {}", config.latency.endpoints.len()));
    summary.push(format!(
        "Ping Timeout: {}ms (per endpoint {}ms)",
        config.latency.timeout_ms, config.latency.endpoint_timeout_ms
    ));
    summary.push(format!("Correction Factor: {}", config.latency.correction_factor));
    summary.push(format!("Download Endpoints: {}", config.download.endpoints.len()));
    summary.push(format!("Upload Endpoints: {}", config.upload.endpoints.len()));
    summary.push(format!(
        "Duration: {}ms download, {}ms upload",
        config.download.duration_ms, config.upload.duration_ms
    ));
    summary.push(format!("Upload Concurrency: {}", config.upload.concurrency));
    summary.push(format!("Color Output: {}", config.enable_color));
    summary.push(format!("Verbose: {}", config.verbose));
    summary.push(format!("Debug: {}", config.debug));

    summary.join("\n")
}
