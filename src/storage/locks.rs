//! Row locks for units of work
//!
//! Every mutable row (user balance, redeemable code, job) is guarded by an async
//! mutex keyed by [`RowKey`]. A [`LockSet`] acquires its keys in the total order of
//! `RowKey` (codes, then phones, then users, then jobs), so two operations touching
//! the same pair of rows can never wait on each other in opposite order.
//!
//! Locks are released when the `LockSet` is dropped, on success and error paths
//! alike. Slots with no remaining holder or waiter are removed from the table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use tracing::trace;
use uuid::Uuid;

/// Identity of a lockable row. Variant order is the global lock order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    Code(String),
    Phone(String),
    User(u64),
    Job(Uuid),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Code(code) => write!(f, "code:{code}"),
            RowKey::Phone(phone) => write!(f, "phone:{phone}"),
            RowKey::User(id) => write!(f, "user:{id}"),
            RowKey::Job(id) => write!(f, "job:{id}"),
        }
    }
}

type Slots = HashMap<RowKey, Arc<RowMutex<()>>>;

/// Lock table shared by every unit of work on one store
#[derive(Clone, Default)]
pub struct RowLocks {
    slots: Arc<Mutex<Slots>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive locks on all `keys`, sorted and deduplicated first.
    pub async fn acquire(&self, keys: impl IntoIterator<Item = RowKey>) -> LockSet {
        let mut keys: Vec<RowKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let slot = self.slot(key);
            guards.push(slot.lock_owned().await);
            trace!(row = %key, "Row lock acquired");
        }

        LockSet {
            keys,
            guards,
            table: self.clone(),
        }
    }

    /// Number of rows currently tracked (held or awaited)
    pub fn tracked(&self) -> usize {
        self.table().len()
    }

    fn slot(&self, key: &RowKey) -> Arc<RowMutex<()>> {
        self.table().entry(key.clone()).or_default().clone()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, Slots> {
        // The table holds no invariants a panicking holder could break.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A set of held row locks. Dropping it releases every lock.
pub struct LockSet {
    keys: Vec<RowKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    table: RowLocks,
}

impl LockSet {
    /// Whether this set holds the lock for `key`
    pub fn holds(&self, key: &RowKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    /// Held keys in acquisition order
    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }
}

impl fmt::Debug for LockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockSet").field("keys", &self.keys).finish()
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        self.guards.clear();

        let mut table = self.table.table();
        for key in &self.keys {
            let idle = table
                .get(key)
                .is_some_and(|slot| Arc::strong_count(slot) == 1);
            if idle {
                table.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_lock_order_puts_codes_before_users() {
        let mut keys = vec![
            RowKey::Job(Uuid::nil()),
            RowKey::User(1),
            RowKey::Code("ZZZ".into()),
            RowKey::Phone("13800000000".into()),
        ];
        keys.sort();
        assert!(matches!(keys[0], RowKey::Code(_)));
        assert!(matches!(keys[1], RowKey::Phone(_)));
        assert!(matches!(keys[2], RowKey::User(_)));
        assert!(matches!(keys[3], RowKey::Job(_)));
    }

    #[tokio::test]
    async fn test_acquire_sorts_and_dedups() {
        let locks = RowLocks::new();
        let set = locks
            .acquire([RowKey::User(2), RowKey::Code("A".into()), RowKey::User(2)])
            .await;

        assert_eq!(set.keys(), &[RowKey::Code("A".into()), RowKey::User(2)]);
        assert!(set.holds(&RowKey::User(2)));
        assert!(!set.holds(&RowKey::User(3)));
    }

    #[tokio::test]
    async fn test_same_row_serializes() {
        let locks = RowLocks::new();
        let first = locks.acquire([RowKey::User(1)]).await;

        let blocked = timeout(Duration::from_millis(50), locks.acquire([RowKey::User(1)])).await;
        assert!(blocked.is_err(), "second holder must wait for the first");

        drop(first);
        let second = timeout(Duration::from_millis(500), locks.acquire([RowKey::User(1)])).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_different_rows_do_not_block() {
        let locks = RowLocks::new();
        let _first = locks.acquire([RowKey::User(1)]).await;

        let other = timeout(Duration::from_millis(500), locks.acquire([RowKey::User(2)])).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_idle_slots_are_pruned() {
        let locks = RowLocks::new();
        {
            let _set = locks.acquire([RowKey::User(1), RowKey::Code("X".into())]).await;
            assert_eq!(locks.tracked(), 2);
        }
        assert_eq!(locks.tracked(), 0);
    }
}
