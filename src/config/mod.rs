//! Configuration management for GradeBox
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use gradebox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `GRADEBOX__<section>__<key>`:
//! - `GRADEBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `GRADEBOX__BILLING__SUBMISSION_FEE=15`
//! - `GRADEBOX__GRADER__REQUEST_TIMEOUT=10s`
//!
//! The grader bearer token is only read from `GRADEBOX_GRADER_TOKEN`.
//!
//! # Configuration File
//!
//! Loaded from `config/gradebox.toml` unless `GRADEBOX_CONFIG` points elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    ApiLimits, BillingConfig, CodesConfig, Config, DispatchConfig, GraderConfig, ServerConfig,
    TelemetryConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or a value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[billing]\nsubmission_fee = 5\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.billing.submission_fee, 5);
        assert_eq!(config.dispatch.workers, 4);
    }

    #[test]
    fn test_validation_catches_negative_fee() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[billing]\nsubmission_fee = -1\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidSubmissionFee(-1))
        ));
    }

    #[test]
    fn test_malformed_duration_is_a_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[grader]\nrequest_timeout = \"soon\"\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(result.unwrap_err(), ConfigError::LoadError(_)));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:8088"
fjall_path = "data/gradebox"

[server.api]
max_body_bytes = "2MB"
max_history = 50

[billing]
submission_fee = 10

[codes]
default_expire_days = 30
max_generate_count = 200

[grader]
base_url = "http://grader:8000"
request_timeout = "5s"

[dispatch]
workers = 2
channel_size = 64

[telemetry]
log_filter = "gradebox=debug,tower_http=info"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.server.api.max_body_bytes, ByteSize(2 * 1024 * 1024));
        assert_eq!(config.server.api.max_history, 50);
        assert_eq!(config.dispatch.workers, 2);
        assert_eq!(config.telemetry.log_filter, "gradebox=debug,tower_http=info");

        // Round-trips through the TOML the CLI prints
        let rendered = toml::to_string(&config).unwrap();
        assert!(rendered.contains("submission_fee = 10"));
        assert!(!rendered.contains("token"));
    }
}
