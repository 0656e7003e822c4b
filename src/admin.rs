//! Manual balance corrections
//!
//! Privileged and unguarded here: callers are trusted operators. Adjustments
//! bypass the balance check and are booked as `system_adjust`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::ledger::{adjust_in, LedgerError, Transaction};
use crate::storage::{FjallStore, RowKey, StoreError};

const DEFAULT_REASON: &str = "SYSTEM_ADJUST";

/// Who an adjustment applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustTarget {
    User(u64),
    Phone(String),
}

#[derive(Debug, Error)]
pub enum AdjustError {
    #[error("No user with phone {0}")]
    PhoneNotFound(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
pub struct Adjustment {
    pub user_id: u64,
    pub balance: i64,
    pub transaction: Transaction,
}

#[derive(Clone)]
pub struct AdminAdjustment {
    store: Arc<FjallStore>,
}

impl AdminAdjustment {
    pub fn new(store: Arc<FjallStore>) -> Self {
        Self { store }
    }

    pub async fn adjust(
        &self,
        target: AdjustTarget,
        amount: i64,
        reason: Option<&str>,
    ) -> Result<Adjustment, AdjustError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount.into());
        }

        let user_id = match target {
            AdjustTarget::User(id) => id,
            AdjustTarget::Phone(phone) => {
                let phone = phone.trim();
                self.store
                    .user_id_by_phone(phone)?
                    .ok_or_else(|| AdjustError::PhoneNotFound(phone.to_string()))?
            }
        };

        let reason = match reason.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => DEFAULT_REASON,
        };

        let locks = self.store.lock([RowKey::User(user_id)]).await;
        let posting = self
            .store
            .atomically(&locks, |unit| adjust_in(unit, user_id, amount, reason))?;

        info!(
            user_id,
            amount,
            reason,
            balance = posting.balance(),
            "Balance adjusted"
        );
        Ok(Adjustment {
            user_id,
            balance: posting.balance(),
            transaction: posting.into_transaction(),
        })
    }
}
