use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("Code not found: {0}")]
    NotFound(String),

    #[error("Code already used: {0}")]
    AlreadyUsed(String),

    #[error("Code expired: {0}")]
    Expired(String),

    #[error("Code must not be empty")]
    EmptyCode,

    #[error("Count must be between 1 and {max}, got {count}")]
    InvalidCount { count: usize, max: usize },

    #[error("Points must be positive, got {0}")]
    InvalidPoints(i64),

    #[error("Expiry must be between 1 and {max} days, got {days}")]
    InvalidExpiry { days: u32, max: u32 },

    #[error("Generated code collided with an existing one: {0}")]
    Collision(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RedeemError>;
