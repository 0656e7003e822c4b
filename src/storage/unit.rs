use std::collections::HashMap;

use fjall::Batch;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::codes::RedeemableCode;
use crate::jobs::Job;
use crate::ledger::{Posting, Transaction, User};

use super::error::{Result, StoreError};
use super::locks::{LockSet, RowKey};
use super::partitions::{
    encode_code_key, encode_job_key, encode_phone_key, encode_txn_key, encode_user_job_key,
    encode_user_key, encode_user_txn_key,
};
use super::store::{parse_user_id, FjallStore, Table};

/// Writes staged for a single atomic commit
///
/// Reads consult the staged writes first, so work inside the unit sees its
/// own effects. Row mutations require the matching lock in the unit's
/// [`LockSet`]. Dropping the unit without [`commit`](Self::commit) discards
/// everything.
pub struct UnitOfWork<'a> {
    store: &'a FjallStore,
    locks: &'a LockSet,
    batch: Batch,
    staged: HashMap<(Table, Vec<u8>), Vec<u8>>,
    id: u64,
}

impl<'a> UnitOfWork<'a> {
    pub(super) fn new(store: &'a FjallStore, locks: &'a LockSet, id: u64) -> Self {
        Self {
            store,
            locks,
            batch: store.keyspace().batch(),
            staged: HashMap::new(),
            id,
        }
    }

    /// Identity of this unit, stamped on every posting made inside it
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn holds(&self, key: &RowKey) -> bool {
        self.locks.holds(key)
    }

    fn require_lock(&self, key: RowKey) -> Result<()> {
        if self.locks.holds(&key) {
            Ok(())
        } else {
            Err(StoreError::LockNotHeld(key.to_string()))
        }
    }

    fn read_raw(&self, table: Table, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.staged.get(&(table, key.clone())) {
            return Ok(Some(value.clone()));
        }
        Ok(self.store.partition(table).get(key)?.map(|v| v.to_vec()))
    }

    fn read<T: DeserializeOwned>(&self, table: Table, key: Vec<u8>) -> Result<Option<T>> {
        match self.read_raw(table, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn write_raw(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.batch
            .insert(self.store.partition(table), key.clone(), value.clone());
        self.staged.insert((table, key), value);
    }

    fn write<T: Serialize>(&mut self, table: Table, key: Vec<u8>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.write_raw(table, key, bytes);
        Ok(())
    }

    // Users

    /// Read a user whose row lock this unit holds
    pub fn user_for_update(&self, user_id: u64) -> Result<Option<User>> {
        self.require_lock(RowKey::User(user_id))?;
        self.read(Table::Users, encode_user_key(user_id))
    }

    pub fn put_user(&mut self, user: &User) -> Result<()> {
        self.require_lock(RowKey::User(user.id))?;
        self.write(Table::Users, encode_user_key(user.id), user)
    }

    /// Insert a new user and its phone index entry
    pub fn insert_user(&mut self, user: &User) -> Result<()> {
        self.require_lock(RowKey::User(user.id))?;
        if let Some(phone) = &user.phone {
            self.require_lock(RowKey::Phone(phone.clone()))?;
            self.write_raw(
                Table::Phones,
                encode_phone_key(phone),
                user.id.to_string().into_bytes(),
            );
        }
        self.write(Table::Users, encode_user_key(user.id), user)
    }

    pub fn user_id_by_phone(&self, phone: &str) -> Result<Option<u64>> {
        match self.read_raw(Table::Phones, encode_phone_key(phone))? {
            Some(value) => parse_user_id(&value).map(Some),
            None => Ok(None),
        }
    }

    // Transactions

    pub fn transaction(&self, txn_id: u64) -> Result<Option<Transaction>> {
        self.read(Table::Transactions, encode_txn_key(txn_id))
    }

    pub fn next_transaction_id(&self) -> u64 {
        self.store.allocate_txn_id()
    }

    /// Append a transaction to the log and its owner's index
    pub fn insert_transaction(&mut self, txn: &Transaction) -> Result<()> {
        self.require_lock(RowKey::User(txn.user_id))?;
        self.write(Table::Transactions, encode_txn_key(txn.id), txn)?;
        self.write_raw(
            Table::UserTransactions,
            encode_user_txn_key(txn.user_id, txn.id),
            Vec::new(),
        );
        Ok(())
    }

    // Codes

    pub fn code_for_update(&self, code: &str) -> Result<Option<RedeemableCode>> {
        self.require_lock(RowKey::Code(code.to_string()))?;
        self.read(Table::Codes, encode_code_key(code))
    }

    pub fn put_code(&mut self, code: &RedeemableCode) -> Result<()> {
        self.require_lock(RowKey::Code(code.code.clone()))?;
        self.write(Table::Codes, encode_code_key(&code.code), code)
    }

    // Jobs

    pub fn job_for_update(&self, job_id: &Uuid) -> Result<Option<Job>> {
        self.require_lock(RowKey::Job(*job_id))?;
        self.read(Table::Jobs, encode_job_key(job_id))
    }

    pub fn put_job(&mut self, job: &Job) -> Result<()> {
        self.require_lock(RowKey::Job(job.id))?;
        self.write(Table::Jobs, encode_job_key(&job.id), job)
    }

    /// Insert a new job. `charge` must be the posting that paid for it and
    /// must have been made in this unit.
    pub fn insert_job(&mut self, job: &Job, charge: &Posting) -> Result<()> {
        self.require_lock(RowKey::Job(job.id))?;
        self.require_lock(RowKey::User(job.user_id))?;

        let txn = charge.transaction();
        let backed = charge.unit() == self.id
            && txn.id == job.charge_transaction_id
            && txn.user_id == job.user_id
            && self.staged.contains_key(&(Table::Transactions, encode_txn_key(txn.id)));
        if !backed {
            return Err(StoreError::UnchargedJob(job.id.to_string()));
        }

        self.write(Table::Jobs, encode_job_key(&job.id), job)?;
        self.write_raw(
            Table::UserJobs,
            encode_user_job_key(job.user_id, &job.id),
            Vec::new(),
        );
        Ok(())
    }

    pub(super) fn commit(self) -> Result<()> {
        let writes = self.staged.len();
        if writes == 0 {
            return Ok(());
        }
        self.batch.commit()?;
        debug!(unit = self.id, writes, "Unit of work committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::jobs::JobInput;
    use crate::ledger::{debit_in, Ledger, LedgerError};

    type UnitResult = std::result::Result<(), LedgerError>;

    struct Fixture {
        store: Arc<FjallStore>,
        ledger: Ledger,
        user_id: u64,
        _temp: TempDir,
    }

    async fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FjallStore::open(temp_dir.path().join("unit")).unwrap());
        let ledger = Ledger::new(store.clone());
        let user_id = ledger.create_user(None, 30).await.unwrap().id;
        Fixture {
            store,
            ledger,
            user_id,
            _temp: temp_dir,
        }
    }

    fn essay() -> JobInput {
        JobInput::Text {
            content: "essay".to_string(),
            context: None,
        }
    }

    fn assert_uncharged(result: UnitResult) {
        assert!(
            matches!(result, Err(LedgerError::Store(StoreError::UnchargedJob(_)))),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn test_insert_job_with_same_unit_charge() {
        let f = fixture().await;
        let job_id = Uuid::now_v7();
        let locks = f.store.lock([RowKey::User(f.user_id), RowKey::Job(job_id)]).await;

        f.store
            .atomically(&locks, |unit| -> UnitResult {
                let charge = debit_in(unit, f.user_id, 10, "fee")?;
                unit.insert_job(&Job::charged(job_id, essay(), &charge), &charge)?;
                Ok(())
            })
            .unwrap();

        assert!(f.store.job(&job_id).unwrap().is_some());
        assert_eq!(f.ledger.balance(f.user_id).unwrap(), 20);
    }

    #[tokio::test]
    async fn test_insert_job_rejects_detached_charge() {
        let f = fixture().await;
        let job_id = Uuid::now_v7();
        let locks = f.store.lock([RowKey::User(f.user_id), RowKey::Job(job_id)]).await;

        let result = f.store.atomically(&locks, |unit| -> UnitResult {
            let charge = debit_in(unit, f.user_id, 10, "fee")?;
            let detached = Posting::detached(charge.transaction().clone());
            unit.insert_job(&Job::charged(job_id, essay(), &detached), &detached)?;
            Ok(())
        });

        assert_uncharged(result);
        assert_eq!(f.store.stats().unwrap().job_count, 0);
        assert_eq!(f.ledger.balance(f.user_id).unwrap(), 30);
    }

    #[tokio::test]
    async fn test_insert_job_rejects_charge_from_another_unit() {
        let f = fixture().await;
        let job_id = Uuid::now_v7();
        let locks = f.store.lock([RowKey::User(f.user_id), RowKey::Job(job_id)]).await;

        let earlier = f
            .store
            .atomically(&locks, |unit| debit_in(unit, f.user_id, 10, "fee"))
            .unwrap();
        let result = f.store.atomically(&locks, |unit| -> UnitResult {
            unit.insert_job(&Job::charged(job_id, essay(), &earlier), &earlier)?;
            Ok(())
        });

        assert_uncharged(result);
        assert_eq!(f.store.stats().unwrap().job_count, 0);
    }

    #[tokio::test]
    async fn test_insert_job_rejects_mismatched_charge_id() {
        let f = fixture().await;
        let job_id = Uuid::now_v7();
        let locks = f.store.lock([RowKey::User(f.user_id), RowKey::Job(job_id)]).await;

        let result = f.store.atomically(&locks, |unit| -> UnitResult {
            let charge = debit_in(unit, f.user_id, 10, "fee")?;
            let mut job = Job::charged(job_id, essay(), &charge);
            job.charge_transaction_id += 1;
            unit.insert_job(&job, &charge)?;
            Ok(())
        });

        assert_uncharged(result);
        assert_eq!(f.store.stats().unwrap().job_count, 0);
        assert_eq!(f.ledger.balance(f.user_id).unwrap(), 30);
    }
}
