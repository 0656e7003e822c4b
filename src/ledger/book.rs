use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::storage::{FjallStore, RowKey, UnitOfWork};

use super::error::{LedgerError, Result};
use super::model::{Direction, Posting, Reconciliation, Transaction, TransactionKind, User};

const PHONE_LEN: std::ops::RangeInclusive<usize> = 6..=20;

/// Balances and the append-only transaction log
///
/// The async methods lock the user row and run one unit of work each. Other
/// components that need a ledger mutation as part of their own unit call
/// [`debit_in`], [`credit_in`] or [`adjust_in`] with the unit they hold.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<FjallStore>,
}

impl Ledger {
    pub fn new(store: Arc<FjallStore>) -> Self {
        Self { store }
    }

    /// Take `amount` from the user's balance as a `spend`
    pub async fn debit(&self, user_id: u64, amount: i64, reason: &str) -> Result<Transaction> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let locks = self.store.lock([RowKey::User(user_id)]).await;
        let posting = self
            .store
            .atomically(&locks, |unit| debit_in(unit, user_id, amount, reason))?;
        Ok(posting.into_transaction())
    }

    pub async fn credit(
        &self,
        user_id: u64,
        amount: i64,
        reason: &str,
        kind: TransactionKind,
    ) -> Result<Transaction> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let locks = self.store.lock([RowKey::User(user_id)]).await;
        let posting = self
            .store
            .atomically(&locks, |unit| credit_in(unit, user_id, amount, reason, kind))?;
        Ok(posting.into_transaction())
    }

    pub fn balance(&self, user_id: u64) -> Result<i64> {
        self.store
            .user(user_id)?
            .map(|user| user.balance)
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    pub fn user(&self, user_id: u64) -> Result<User> {
        self.store
            .user(user_id)?
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    pub fn user_id_by_phone(&self, phone: &str) -> Result<Option<u64>> {
        Ok(self.store.user_id_by_phone(phone)?)
    }

    /// Newest first
    pub fn history(&self, user_id: u64, limit: Option<usize>) -> Result<Vec<Transaction>> {
        self.user(user_id)?;
        Ok(self.store.transactions_for_user(user_id, limit)?)
    }

    /// Register a user. A positive opening balance is booked as a `topup` so
    /// the log accounts for it.
    pub async fn create_user(&self, phone: Option<String>, initial_balance: i64) -> Result<User> {
        if initial_balance < 0 {
            return Err(LedgerError::InvalidInitialBalance(initial_balance));
        }
        let phone = phone.map(|p| p.trim().to_string());
        if let Some(phone) = &phone {
            if !PHONE_LEN.contains(&phone.chars().count()) {
                return Err(LedgerError::InvalidPhone(phone.clone()));
            }
        }

        let user_id = self.store.allocate_user_id();
        let mut keys = vec![RowKey::User(user_id)];
        if let Some(phone) = &phone {
            keys.push(RowKey::Phone(phone.clone()));
        }
        let locks = self.store.lock(keys).await;

        let user = self.store.atomically(&locks, |unit| -> Result<User> {
            if let Some(phone) = &phone {
                if unit.user_id_by_phone(phone)?.is_some() {
                    return Err(LedgerError::PhoneTaken(phone.clone()));
                }
            }
            unit.insert_user(&User::new(user_id, phone.clone()))?;
            if initial_balance > 0 {
                credit_in(
                    unit,
                    user_id,
                    initial_balance,
                    "Initial balance",
                    TransactionKind::Topup,
                )?;
            }
            load(unit, user_id)
        })?;

        info!(user_id, balance = user.balance, "User created");
        Ok(user)
    }

    /// Replay a user's log and compare it with the stored balance
    pub async fn reconcile(&self, user_id: u64) -> Result<Reconciliation> {
        let _locks = self.store.lock([RowKey::User(user_id)]).await;
        let user = self.user(user_id)?;
        let transactions = self.store.transactions_for_user(user_id, None)?;

        let ledger_sum = transactions
            .iter()
            .fold(0i64, |sum, txn| sum.saturating_add(txn.amount));
        let consistent = ledger_sum == user.balance
            && transactions.first().map(|t| t.id) == user.last_transaction_id;

        if !consistent {
            warn!(
                user_id,
                balance = user.balance,
                ledger_sum,
                "Ledger does not reconcile"
            );
        }

        Ok(Reconciliation {
            user_id,
            balance: user.balance,
            ledger_sum,
            transactions: transactions.len(),
            consistent,
        })
    }

    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>> {
        let mut reports = Vec::new();
        for user_id in self.store.user_ids()? {
            reports.push(self.reconcile(user_id).await?);
        }
        Ok(reports)
    }
}

/// Debit inside the caller's unit. Fails without writing anything when the
/// balance does not cover `amount`.
pub fn debit_in(
    unit: &mut UnitOfWork<'_>,
    user_id: u64,
    amount: i64,
    description: &str,
) -> Result<Posting> {
    if amount <= 0 {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    let user = load(unit, user_id)?;
    if user.balance < amount {
        return Err(LedgerError::InsufficientBalance {
            balance: user.balance,
            required: amount,
        });
    }
    post(unit, user, TransactionKind::Spend, -amount, description)
}

pub fn credit_in(
    unit: &mut UnitOfWork<'_>,
    user_id: u64,
    amount: i64,
    description: &str,
    kind: TransactionKind,
) -> Result<Posting> {
    if amount <= 0 {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    if kind.direction() == Direction::Debit {
        return Err(LedgerError::KindMismatch { kind, amount });
    }
    let user = load(unit, user_id)?;
    post(unit, user, kind, amount, description)
}

/// Administrative correction. Either sign, never zero, no balance check.
pub fn adjust_in(
    unit: &mut UnitOfWork<'_>,
    user_id: u64,
    amount: i64,
    description: &str,
) -> Result<Posting> {
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    let user = load(unit, user_id)?;
    post(unit, user, TransactionKind::SystemAdjust, amount, description)
}

fn load(unit: &UnitOfWork<'_>, user_id: u64) -> Result<User> {
    unit.user_for_update(user_id)?
        .ok_or(LedgerError::UserNotFound(user_id))
}

fn post(
    unit: &mut UnitOfWork<'_>,
    mut user: User,
    kind: TransactionKind,
    amount: i64,
    description: &str,
) -> Result<Posting> {
    if !kind.accepts(amount) {
        return Err(LedgerError::KindMismatch { kind, amount });
    }
    verify_chain(unit, &user)?;

    let balance_after = user
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::Overflow(user.id))?;

    let now = Utc::now();
    let txn = Transaction {
        id: unit.next_transaction_id(),
        user_id: user.id,
        kind,
        amount,
        balance_after,
        description: description.to_string(),
        created_at: now,
    };

    user.balance = balance_after;
    user.last_transaction_id = Some(txn.id);
    user.last_active_at = now;

    unit.insert_transaction(&txn)?;
    unit.put_user(&user)?;

    debug!(
        user_id = user.id,
        txn_id = txn.id,
        %kind,
        amount,
        balance_after,
        "Transaction posted"
    );
    Ok(Posting::new(txn, unit.id()))
}

/// The stored balance must equal the last logged `balance_after`
fn verify_chain(unit: &UnitOfWork<'_>, user: &User) -> Result<()> {
    let expected = match user.last_transaction_id {
        Some(txn_id) => {
            let last = unit.transaction(txn_id)?.ok_or_else(|| LedgerError::Inconsistent {
                user_id: user.id,
                detail: format!("last transaction {txn_id} is missing"),
            })?;
            last.balance_after
        }
        None => 0,
    };

    if expected != user.balance {
        return Err(LedgerError::Inconsistent {
            user_id: user.id,
            detail: format!("balance {} but log ends at {}", user.balance, expected),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;
    use tempfile::TempDir;

    fn create_test_ledger() -> (Ledger, Arc<FjallStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FjallStore::open(temp_dir.path().join("ledger")).unwrap());
        (Ledger::new(store.clone()), store, temp_dir)
    }

    #[tokio::test]
    async fn test_create_user_books_initial_topup() {
        let (ledger, _store, _temp) = create_test_ledger();
        let user = ledger
            .create_user(Some("13800000000".to_string()), 25)
            .await
            .unwrap();

        assert_eq!(user.balance, 25);
        let history = ledger.history(user.id, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Topup);
        assert_eq!(history[0].amount, 25);
        assert_eq!(history[0].balance_after, 25);
    }

    #[tokio::test]
    async fn test_create_user_with_zero_balance_has_empty_log() {
        let (ledger, _store, _temp) = create_test_ledger();
        let user = ledger.create_user(None, 0).await.unwrap();

        assert_eq!(ledger.balance(user.id).unwrap(), 0);
        assert!(ledger.history(user.id, None).unwrap().is_empty());
        assert!(ledger.reconcile(user.id).await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_duplicate_phone_rejected() {
        let (ledger, _store, _temp) = create_test_ledger();
        ledger
            .create_user(Some("13800000000".to_string()), 0)
            .await
            .unwrap();

        let err = ledger
            .create_user(Some("13800000000".to_string()), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::PhoneTaken(_)));
    }

    #[tokio::test]
    async fn test_phone_length_checked() {
        let (ledger, _store, _temp) = create_test_ledger();
        let err = ledger.create_user(Some("123".to_string()), 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPhone(_)));
    }

    #[tokio::test]
    async fn test_debit_and_credit() {
        let (ledger, _store, _temp) = create_test_ledger();
        let user = ledger.create_user(None, 30).await.unwrap();

        let spend = ledger.debit(user.id, 10, "Essay submission deduction").await.unwrap();
        assert_eq!(spend.kind, TransactionKind::Spend);
        assert_eq!(spend.amount, -10);
        assert_eq!(spend.balance_after, 20);

        let topup = ledger
            .credit(user.id, 5, "top up", TransactionKind::Topup)
            .await
            .unwrap();
        assert_eq!(topup.balance_after, 25);
        assert_eq!(ledger.balance(user.id).unwrap(), 25);

        let history = ledger.history(user.id, Some(2)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, topup.id);
        assert_eq!(history[1].id, spend.id);
    }

    #[tokio::test]
    async fn test_insufficient_balance_writes_nothing() {
        let (ledger, store, _temp) = create_test_ledger();
        let user = ledger.create_user(None, 5).await.unwrap();
        let txns_before = store.stats().unwrap().transaction_count;

        let err = ledger.debit(user.id, 6, "too much").await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance {
                balance: 5,
                required: 6
            }
        ));
        assert_eq!(ledger.balance(user.id).unwrap(), 5);
        assert_eq!(store.stats().unwrap().transaction_count, txns_before);
    }

    #[tokio::test]
    async fn test_amount_validation() {
        let (ledger, _store, _temp) = create_test_ledger();
        let user = ledger.create_user(None, 5).await.unwrap();

        assert!(matches!(
            ledger.debit(user.id, 0, "x").await,
            Err(LedgerError::NonPositiveAmount(0))
        ));
        assert!(matches!(
            ledger.credit(user.id, -1, "x", TransactionKind::Topup).await,
            Err(LedgerError::NonPositiveAmount(-1))
        ));
        assert!(matches!(
            ledger.credit(user.id, 1, "x", TransactionKind::Spend).await,
            Err(LedgerError::KindMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_credit_overflow_is_rejected() {
        let (ledger, _store, _temp) = create_test_ledger();
        let user = ledger.create_user(None, 1).await.unwrap();

        let err = ledger
            .credit(user.id, i64::MAX, "x", TransactionKind::Topup)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Overflow(_)));
        assert_eq!(ledger.balance(user.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (ledger, _store, _temp) = create_test_ledger();
        assert!(matches!(ledger.balance(42), Err(LedgerError::UserNotFound(42))));
        assert!(matches!(
            ledger.debit(42, 1, "x").await,
            Err(LedgerError::UserNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_adjust_may_go_negative() {
        let (ledger, store, _temp) = create_test_ledger();
        let user = ledger.create_user(None, 3).await.unwrap();

        let locks = store.lock([RowKey::User(user.id)]).await;
        let posting = store
            .atomically(&locks, |unit| adjust_in(unit, user.id, -10, "SYSTEM_ADJUST"))
            .unwrap();
        drop(locks);

        assert_eq!(posting.balance(), -7);
        assert_eq!(posting.transaction().kind, TransactionKind::SystemAdjust);
        assert!(ledger.reconcile(user.id).await.unwrap().consistent);

        let locks = store.lock([RowKey::User(user.id)]).await;
        let zero = store.atomically(&locks, |unit| adjust_in(unit, user.id, 0, "noop"));
        assert!(matches!(zero, Err(LedgerError::ZeroAmount)));
    }

    #[tokio::test]
    async fn test_broken_chain_is_detected_at_write_time() {
        let (ledger, store, _temp) = create_test_ledger();
        let user = ledger.create_user(None, 10).await.unwrap();

        // Tamper with the balance without logging a transaction.
        let locks = store.lock([RowKey::User(user.id)]).await;
        store
            .atomically::<_, StoreError, _>(&locks, |unit| {
                let mut user = unit.user_for_update(user.id)?.unwrap();
                user.balance = 99;
                unit.put_user(&user)
            })
            .unwrap();
        drop(locks);

        let err = ledger.debit(user.id, 1, "x").await.unwrap_err();
        assert!(matches!(err, LedgerError::Inconsistent { .. }));
        assert!(!ledger.reconcile(user.id).await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_concurrent_debits_lose_no_updates() {
        let (ledger, _store, _temp) = create_test_ledger();
        let n = 20;
        let user = ledger.create_user(None, n).await.unwrap();
        let user_id = user.id;

        let mut handles = Vec::new();
        for _ in 0..n {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.debit(user_id, 1, "x").await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.balance(user.id).unwrap(), 0);
        assert!(matches!(
            ledger.debit(user.id, 1, "x").await,
            Err(LedgerError::InsufficientBalance { .. })
        ));

        let report = ledger.reconcile(user.id).await.unwrap();
        assert!(report.consistent);
        assert_eq!(report.transactions, n as usize + 1);
    }

    #[tokio::test]
    async fn test_reconcile_all_covers_every_user() {
        let (ledger, _store, _temp) = create_test_ledger();
        for balance in [0, 5, 50] {
            ledger.create_user(None, balance).await.unwrap();
        }

        let reports = ledger.reconcile_all().await.unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.consistent && r.balance == r.ledger_sum));
    }
}
