use thiserror::Error;

use super::model::TransactionKind;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("Amount must not be zero")]
    ZeroAmount,

    #[error("Amount {amount} is not valid for a {kind} transaction")]
    KindMismatch { kind: TransactionKind, amount: i64 },

    #[error("Balance overflow for user {0}")]
    Overflow(u64),

    #[error("User not found: {0}")]
    UserNotFound(u64),

    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("Phone already registered: {0}")]
    PhoneTaken(String),

    #[error("Phone must be 6-20 characters: {0:?}")]
    InvalidPhone(String),

    #[error("Initial balance must not be negative, got {0}")]
    InvalidInitialBalance(i64),

    #[error("Ledger inconsistent for user {user_id}: {detail}")]
    Inconsistent { user_id: u64, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
