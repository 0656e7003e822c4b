use std::time::Duration;

use thiserror::Error;

use super::models::AdjustRequest;
use crate::admin::AdjustTarget;
use crate::humanize::HumanDuration;

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("exactly one of user_id and phone must be set")]
    AmbiguousTarget,
    #[error("limit must be between 1 and {max}, got {got}")]
    InvalidLimit { got: usize, max: usize },
    #[error("invalid job id '{0}'")]
    InvalidJobId(String),
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),
}

/// Resolve which user an adjustment applies to
pub fn adjust_target(request: &AdjustRequest) -> Result<AdjustTarget, RequestValidationError> {
    let phone = request
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());

    match (request.user_id, phone) {
        (Some(id), None) => Ok(AdjustTarget::User(id)),
        (None, Some(phone)) => Ok(AdjustTarget::Phone(phone.to_string())),
        _ => Err(RequestValidationError::AmbiguousTarget),
    }
}

/// Effective page size for transaction history
pub fn history_limit(
    requested: Option<usize>,
    max: usize,
) -> Result<usize, RequestValidationError> {
    match requested {
        None => Ok(DEFAULT_HISTORY_LIMIT.min(max)),
        Some(got) if got == 0 || got > max => {
            Err(RequestValidationError::InvalidLimit { got, max })
        }
        Some(got) => Ok(got),
    }
}

pub fn parse_job_id(raw: &str) -> Result<uuid::Uuid, RequestValidationError> {
    uuid::Uuid::parse_str(raw).map_err(|_| RequestValidationError::InvalidJobId(raw.to_string()))
}

/// Orphan sweep cutoff. Must be non-zero.
pub fn sweep_age(raw: Option<&str>, default: Duration) -> Result<Duration, RequestValidationError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<HumanDuration>() {
        Ok(age) if !age.is_zero() => Ok(age.as_duration()),
        _ => Err(RequestValidationError::InvalidDuration(raw.to_string())),
    }
}
