use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sign a transaction amount must carry for its kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Topup,
    Spend,
    Redeem,
    Adjust,
    SystemAdjust,
}

impl TransactionKind {
    pub fn direction(self) -> Direction {
        match self {
            TransactionKind::Topup | TransactionKind::Redeem => Direction::Credit,
            TransactionKind::Spend => Direction::Debit,
            TransactionKind::Adjust | TransactionKind::SystemAdjust => Direction::Either,
        }
    }

    /// Whether a signed amount is legal for this kind. Zero never is.
    pub fn accepts(self, amount: i64) -> bool {
        match self.direction() {
            Direction::Credit => amount > 0,
            Direction::Debit => amount < 0,
            Direction::Either => amount != 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Topup => "topup",
            TransactionKind::Spend => "spend",
            TransactionKind::Redeem => "redeem",
            TransactionKind::Adjust => "adjust",
            TransactionKind::SystemAdjust => "system_adjust",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub phone: Option<String>,
    pub balance: i64,
    /// Newest transaction in this user's chain, if any
    pub last_transaction_id: Option<u64>,
    pub last_active_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: u64, phone: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            phone,
            balance: 0,
            last_transaction_id: None,
            last_active_at: now,
            created_at: now,
        }
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub user_id: u64,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_after: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Proof that a transaction was posted inside a particular unit of work.
///
/// Only the ledger can mint one, and the store refuses to insert a job unless
/// the posting that paid for it came from the same unit.
#[derive(Debug, Clone)]
pub struct Posting {
    transaction: Transaction,
    unit: u64,
}

impl Posting {
    pub(super) fn new(transaction: Transaction, unit: u64) -> Self {
        Self { transaction, unit }
    }

    #[cfg(test)]
    pub(crate) fn detached(transaction: Transaction) -> Self {
        Self {
            transaction,
            unit: 0,
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn balance(&self) -> i64 {
        self.transaction.balance_after
    }

    pub fn unit(&self) -> u64 {
        self.unit
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}

/// Result of replaying one user's log against their stored balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub user_id: u64,
    pub balance: i64,
    pub ledger_sum: i64,
    pub transactions: usize,
    pub consistent: bool,
}
