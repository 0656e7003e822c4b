use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "GRADEBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/gradebox.toml";
const ENV_PREFIX: &str = "GRADEBOX";
const ENV_SEPARATOR: &str = "__";
const GRADER_TOKEN_VAR: &str = "GRADEBOX_GRADER_TOKEN";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are never read from TOML files, only from the environment
fn load_secrets(config: &mut Config) {
    if let Ok(token) = env::var(GRADER_TOKEN_VAR) {
        if !token.trim().is_empty() {
            config.grader.token = Some(token);
        }
    }
}

/// Load configuration from a specific path plus environment overrides
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // GRADEBOX__BILLING__SUBMISSION_FEE -> billing.submission_fee
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
