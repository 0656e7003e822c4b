use super::models::Config;
use crate::humanize::ByteSize;
use thiserror::Error;

const MAX_BODY_LIMIT: ByteSize = ByteSize(16 * 1024 * 1024);
const MAX_GENERATE_CEILING: usize = 10_000;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_body_bytes ({actual}) must be between 1KB and 16MB")]
    BodyLimitOutOfRange { actual: u64 },

    #[error("Submission fee must be positive, got {0}")]
    InvalidSubmissionFee(i64),

    #[error("codes.default_expire_days must be positive")]
    InvalidExpireDays,

    #[error("codes.max_generate_count must be between 1 and {max}, got {value}")]
    InvalidMaxGenerateCount { value: usize, max: usize },

    #[error("Invalid grader URL '{url}', expected 'http://' or 'https://'")]
    InvalidGraderScheme { url: String },

    #[error("Grader path must start with '/': {field} = {value}")]
    InvalidGraderPath { field: &'static str, value: String },

    #[error("Timeout must be positive: {field}")]
    ZeroTimeout { field: &'static str },

    #[error("Dispatch setting must be positive: {field}")]
    InvalidDispatch { field: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_billing(config)?;
    validate_codes(config)?;
    validate_grader(config)?;
    validate_dispatch(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    let actual = config.server.api.max_body_bytes;
    if actual < ByteSize(1024) || actual > MAX_BODY_LIMIT {
        return Err(ValidationError::BodyLimitOutOfRange {
            actual: actual.as_u64(),
        });
    }
    Ok(())
}

fn validate_billing(config: &Config) -> Result<(), ValidationError> {
    if config.billing.submission_fee <= 0 {
        return Err(ValidationError::InvalidSubmissionFee(
            config.billing.submission_fee,
        ));
    }
    Ok(())
}

fn validate_codes(config: &Config) -> Result<(), ValidationError> {
    if config.codes.default_expire_days == 0 {
        return Err(ValidationError::InvalidExpireDays);
    }
    let value = config.codes.max_generate_count;
    if value == 0 || value > MAX_GENERATE_CEILING {
        return Err(ValidationError::InvalidMaxGenerateCount {
            value,
            max: MAX_GENERATE_CEILING,
        });
    }
    Ok(())
}

fn validate_grader(config: &Config) -> Result<(), ValidationError> {
    let grader = &config.grader;
    if !(grader.base_url.starts_with("http://") || grader.base_url.starts_with("https://")) {
        return Err(ValidationError::InvalidGraderScheme {
            url: grader.base_url.clone(),
        });
    }
    for (field, value) in [
        ("grader.enqueue_path", &grader.enqueue_path),
        ("grader.status_path", &grader.status_path),
    ] {
        if !value.starts_with('/') {
            return Err(ValidationError::InvalidGraderPath {
                field,
                value: value.clone(),
            });
        }
    }
    if grader.connect_timeout.is_zero() {
        return Err(ValidationError::ZeroTimeout {
            field: "grader.connect_timeout",
        });
    }
    if grader.request_timeout.is_zero() {
        return Err(ValidationError::ZeroTimeout {
            field: "grader.request_timeout",
        });
    }
    Ok(())
}

fn validate_dispatch(config: &Config) -> Result<(), ValidationError> {
    if config.dispatch.workers == 0 {
        return Err(ValidationError::InvalidDispatch {
            field: "dispatch.workers",
        });
    }
    if config.dispatch.channel_size == 0 {
        return Err(ValidationError::InvalidDispatch {
            field: "dispatch.channel_size",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_non_positive_fee() {
        let mut config = Config::default();
        config.billing.submission_fee = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidSubmissionFee(0))
        ));
    }

    #[test]
    fn test_rejects_bad_grader_url() {
        let mut config = Config::default();
        config.grader.base_url = "grader:8000".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidGraderScheme { .. })
        ));
    }

    #[test]
    fn test_rejects_relative_grader_path() {
        let mut config = Config::default();
        config.grader.status_path = "status".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidGraderPath {
                field: "grader.status_path",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = Config::default();
        config.grader.request_timeout = HumanDuration::from_millis(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroTimeout { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_worker_pool() {
        let mut config = Config::default();
        config.dispatch.workers = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidDispatch { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_body_limit() {
        let mut config = Config::default();
        config.server.api.max_body_bytes = ByteSize(64 * 1024 * 1024);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::BodyLimitOutOfRange { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_code_settings() {
        let mut config = Config::default();
        config.codes.max_generate_count = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.codes.default_expire_days = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidExpireDays)
        ));
    }
}
