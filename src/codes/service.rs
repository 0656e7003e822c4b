use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::ledger::{credit_in, TransactionKind};
use crate::storage::{FjallStore, RowKey};

use super::error::{RedeemError, Result};
use super::model::RedeemableCode;

const MAX_EXPIRE_DAYS: u32 = 3650;
const CODE_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSettings {
    pub default_expire_days: u32,
    pub max_generate_count: usize,
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self {
            default_expire_days: 30,
            max_generate_count: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub points_added: i64,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedCodes {
    pub codes: Vec<String>,
    pub points: i64,
    pub expires_at: DateTime<Utc>,
}

/// Redeems single-use codes into ledger credits and mints new batches
#[derive(Clone)]
pub struct CodeRedemption {
    store: Arc<FjallStore>,
    settings: CodeSettings,
}

impl CodeRedemption {
    pub fn new(store: Arc<FjallStore>, settings: CodeSettings) -> Self {
        Self { store, settings }
    }

    /// Exchange `code` for its points. The code row is locked before the
    /// user row, and the flip and the credit commit together.
    pub async fn redeem(&self, user_id: u64, code: &str) -> Result<Redemption> {
        let code = code.trim();
        if code.is_empty() {
            return Err(RedeemError::EmptyCode);
        }

        let locks = self
            .store
            .lock([RowKey::Code(code.to_string()), RowKey::User(user_id)])
            .await;

        let redemption = self.store.atomically(&locks, |unit| -> Result<Redemption> {
            let mut record = unit
                .code_for_update(code)?
                .ok_or_else(|| RedeemError::NotFound(code.to_string()))?;

            let now = Utc::now();
            if record.used {
                return Err(RedeemError::AlreadyUsed(code.to_string()));
            }
            if record.is_expired(now) {
                return Err(RedeemError::Expired(code.to_string()));
            }

            record.mark_used(user_id, now);
            unit.put_code(&record)?;

            let posting = credit_in(
                unit,
                user_id,
                record.points_value,
                &format!("Redeemed beta code {}", record.code),
                TransactionKind::Redeem,
            )?;

            Ok(Redemption {
                points_added: record.points_value,
                balance: posting.balance(),
            })
        })?;

        info!(
            user_id,
            code,
            points = redemption.points_added,
            balance = redemption.balance,
            "Code redeemed"
        );
        Ok(redemption)
    }

    /// Mint `count` fresh codes worth `points` each
    pub async fn generate(
        &self,
        count: usize,
        points: i64,
        expire_days: Option<u32>,
    ) -> Result<GeneratedCodes> {
        let max = self.settings.max_generate_count;
        if count == 0 || count > max {
            return Err(RedeemError::InvalidCount { count, max });
        }
        if points <= 0 {
            return Err(RedeemError::InvalidPoints(points));
        }
        let days = expire_days.unwrap_or(self.settings.default_expire_days);
        if days == 0 || days > MAX_EXPIRE_DAYS {
            return Err(RedeemError::InvalidExpiry {
                days,
                max: MAX_EXPIRE_DAYS,
            });
        }

        let mut fresh = BTreeSet::new();
        while fresh.len() < count {
            fresh.insert(random_code());
        }
        let codes: Vec<String> = fresh.into_iter().collect();
        let expires_at = Utc::now() + Duration::days(i64::from(days));

        let locks = self
            .store
            .lock(codes.iter().cloned().map(RowKey::Code))
            .await;

        self.store.atomically(&locks, |unit| -> Result<()> {
            for code in &codes {
                if unit.code_for_update(code)?.is_some() {
                    return Err(RedeemError::Collision(code.clone()));
                }
                unit.put_code(&RedeemableCode::new(code.clone(), points, expires_at))?;
            }
            Ok(())
        })?;

        info!(count, points, %expires_at, "Codes generated");
        Ok(GeneratedCodes {
            codes,
            points,
            expires_at,
        })
    }

    pub fn lookup(&self, code: &str) -> Result<RedeemableCode> {
        let code = code.trim();
        debug!(code, "Looking up code");
        self.store
            .code(code)?
            .ok_or_else(|| RedeemError::NotFound(code.to_string()))
    }

    /// Insert a code with a chosen value, e.g. a well-known promo code
    pub async fn issue(&self, code: &str, points: i64, expires_at: DateTime<Utc>) -> Result<()> {
        let code = code.trim();
        if code.is_empty() {
            return Err(RedeemError::EmptyCode);
        }
        if points <= 0 {
            return Err(RedeemError::InvalidPoints(points));
        }
        let locks = self.store.lock([RowKey::Code(code.to_string())]).await;
        self.store.atomically(&locks, |unit| -> Result<()> {
            if unit.code_for_update(code)?.is_some() {
                return Err(RedeemError::Collision(code.to_string()));
            }
            unit.put_code(&RedeemableCode::new(code, points, expires_at))?;
            Ok(())
        })
    }
}

fn random_code() -> String {
    hex::encode(rand::random::<[u8; CODE_BYTES]>())
}
