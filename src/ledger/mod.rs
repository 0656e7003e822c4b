/// Points ledger: per-user balances and the append-only transaction log
///
/// Every balance change is a [`Transaction`] whose `balance_after` chains to
/// the previous one, and the user row points at the newest entry. A posting
/// checks that chain before writing, so `balance == Σ amount` is verified at
/// write time and can always be re-derived with [`Ledger::reconcile`].
///
/// ## Usage
///
/// ```rust,ignore
/// use gradebox::ledger::{Ledger, TransactionKind};
///
/// let ledger = Ledger::new(store.clone());
/// let user = ledger.create_user(Some("13800000000".into()), 100).await?;
/// ledger.debit(user.id, 10, "Essay submission deduction").await?;
/// ledger.credit(user.id, 50, "promo", TransactionKind::Topup).await?;
/// ```

pub mod book;
pub mod error;
pub mod model;

pub use book::{adjust_in, credit_in, debit_in, Ledger};
pub use error::{LedgerError, Result};
pub use model::{Direction, Posting, Reconciliation, Transaction, TransactionKind, User};
