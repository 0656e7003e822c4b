use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use super::validation::RequestValidationError;
use crate::admin::AdjustError;
use crate::codes::RedeemError;
use crate::jobs::JobError;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("missing or invalid X-Gradebox-User header")]
    Unauthenticated,
    #[error("{0}")]
    Validation(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },
    #[error("code already used: {0}")]
    CodeAlreadyUsed(String),
    #[error("code expired: {0}")]
    CodeExpired(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("grading worker unavailable: {0}")]
    WorkerUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InsufficientBalance { .. }
            | ApiError::CodeAlreadyUsed(_)
            | ApiError::CodeExpired(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::WorkerUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ApiError::CodeAlreadyUsed(_) => "CODE_ALREADY_USED",
            ApiError::CodeExpired(_) => "CODE_EXPIRED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::WorkerUnavailable(_) => "WORKER_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<RequestValidationError> for ApiError {
    fn from(value: RequestValidationError) -> Self {
        ApiError::Validation(value.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::UserNotFound(id) => ApiError::NotFound(format!("user {id}")),
            LedgerError::InsufficientBalance { balance, required } => {
                ApiError::InsufficientBalance { balance, required }
            }
            LedgerError::PhoneTaken(_) => ApiError::Conflict(value.to_string()),
            LedgerError::NonPositiveAmount(_)
            | LedgerError::ZeroAmount
            | LedgerError::KindMismatch { .. }
            | LedgerError::Overflow(_)
            | LedgerError::InvalidPhone(_)
            | LedgerError::InvalidInitialBalance(_) => ApiError::Validation(value.to_string()),
            LedgerError::Inconsistent { .. } | LedgerError::Store(_) => {
                ApiError::Internal(value.to_string())
            }
        }
    }
}

impl From<RedeemError> for ApiError {
    fn from(value: RedeemError) -> Self {
        match value {
            RedeemError::NotFound(code) => ApiError::NotFound(format!("code {code}")),
            RedeemError::AlreadyUsed(code) => ApiError::CodeAlreadyUsed(code),
            RedeemError::Expired(code) => ApiError::CodeExpired(code),
            RedeemError::EmptyCode
            | RedeemError::InvalidCount { .. }
            | RedeemError::InvalidPoints(_)
            | RedeemError::InvalidExpiry { .. } => ApiError::Validation(value.to_string()),
            RedeemError::Ledger(e) => e.into(),
            RedeemError::Collision(_) | RedeemError::Store(_) => {
                ApiError::Internal(value.to_string())
            }
        }
    }
}

impl From<AdjustError> for ApiError {
    fn from(value: AdjustError) -> Self {
        match value {
            AdjustError::PhoneNotFound(phone) => ApiError::NotFound(format!("phone {phone}")),
            AdjustError::Ledger(e) => e.into(),
            AdjustError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(value: JobError) -> Self {
        match value {
            JobError::NotFound(id) => ApiError::NotFound(format!("job {id}")),
            JobError::Forbidden { .. } => ApiError::Forbidden(value.to_string()),
            JobError::InvalidInput(msg) => ApiError::Validation(msg),
            JobError::WorkerUnavailable(e) => ApiError::WorkerUnavailable(e.to_string()),
            JobError::Ledger(e) => e.into(),
            JobError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grader::GraderError;
    use uuid::Uuid;

    #[test]
    fn test_conflicts_map_to_bad_request() {
        let err: ApiError = LedgerError::InsufficientBalance {
            balance: 3,
            required: 10,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");

        let err: ApiError = RedeemError::AlreadyUsed("ABC123".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "CODE_ALREADY_USED");

        let err: ApiError = RedeemError::Expired("ABC123".into()).into();
        assert_eq!(err.code(), "CODE_EXPIRED");
    }

    #[test]
    fn test_nested_ledger_errors_keep_their_status() {
        let err: ApiError = RedeemError::Ledger(LedgerError::UserNotFound(9)).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = JobError::Ledger(LedgerError::InsufficientBalance {
            balance: 0,
            required: 10,
        })
        .into();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");

        let err: ApiError = AdjustError::Ledger(LedgerError::ZeroAmount).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_job_errors() {
        let job_id = Uuid::now_v7();
        let err: ApiError = JobError::Forbidden { job_id, user_id: 2 }.into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err: ApiError = JobError::WorkerUnavailable(GraderError::Timeout).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err: ApiError = JobError::NotFound(job_id).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_duplicate_phone_is_conflict() {
        let err: ApiError = LedgerError::PhoneTaken("13800000000".into()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
