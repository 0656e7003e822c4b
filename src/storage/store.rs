use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codes::RedeemableCode;
use crate::jobs::{Job, JobStatus};
use crate::ledger::{Transaction, User};

use super::error::{Result, StoreError};
use super::locks::{LockSet, RowKey, RowLocks};
use super::partitions::{
    decode_txn_key, decode_user_job_key, decode_user_key, decode_user_txn_key, encode_code_key,
    encode_job_key, encode_phone_key, encode_txn_key, encode_user_job_prefix,
    encode_user_key, encode_user_txn_prefix,
};
use super::unit::UnitOfWork;

/// Logical tables, one Fjall partition each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Phones,
    Transactions,
    UserTransactions,
    Codes,
    Jobs,
    UserJobs,
}

/// Fjall-backed store for users, the transaction log, codes and jobs
///
/// Reads on the handle itself see committed state only. Mutations go through
/// [`FjallStore::atomically`], which stages writes in a batch and commits them
/// together while the caller holds the relevant row locks.
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    users: PartitionHandle,
    phones: PartitionHandle,
    transactions: PartitionHandle,
    user_transactions: PartitionHandle,
    codes: PartitionHandle,
    jobs: PartitionHandle,
    user_jobs: PartitionHandle,
    locks: RowLocks,
    next_txn_id: Arc<AtomicU64>,
    next_user_id: Arc<AtomicU64>,
    next_unit: Arc<AtomicU64>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let users = keyspace.open_partition("users", PartitionCreateOptions::default())?;
        let phones = keyspace.open_partition("phones", PartitionCreateOptions::default())?;
        let transactions =
            keyspace.open_partition("transactions", PartitionCreateOptions::default())?;
        let user_transactions =
            keyspace.open_partition("user_transactions", PartitionCreateOptions::default())?;
        let codes = keyspace.open_partition("codes", PartitionCreateOptions::default())?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let user_jobs = keyspace.open_partition("user_jobs", PartitionCreateOptions::default())?;

        let last_txn = last_id(&transactions, decode_txn_key)?;
        let last_user = last_id(&users, decode_user_key)?;

        info!(last_txn, last_user, "Fjall store opened successfully");
        Ok(Self {
            keyspace,
            users,
            phones,
            transactions,
            user_transactions,
            codes,
            jobs,
            user_jobs,
            locks: RowLocks::new(),
            next_txn_id: Arc::new(AtomicU64::new(last_txn + 1)),
            next_user_id: Arc::new(AtomicU64::new(last_user + 1)),
            next_unit: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Lock rows for update. Keys are taken in the global row order.
    pub async fn lock(&self, keys: impl IntoIterator<Item = RowKey>) -> LockSet {
        self.locks.acquire(keys).await
    }

    /// Run `work` as one unit: everything it stages commits together on `Ok`,
    /// nothing is written on `Err`.
    pub fn atomically<T, E, F>(&self, locks: &LockSet, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let unit_id = self.next_unit.fetch_add(1, Ordering::Relaxed);
        let mut unit = UnitOfWork::new(self, locks, unit_id);
        let value = work(&mut unit)?;
        unit.commit()?;
        Ok(value)
    }

    /// Reserve an id for a user that is about to be created
    pub fn allocate_user_id(&self) -> u64 {
        self.next_user_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn allocate_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(super) fn partition(&self, table: Table) -> &PartitionHandle {
        match table {
            Table::Users => &self.users,
            Table::Phones => &self.phones,
            Table::Transactions => &self.transactions,
            Table::UserTransactions => &self.user_transactions,
            Table::Codes => &self.codes,
            Table::Jobs => &self.jobs,
            Table::UserJobs => &self.user_jobs,
        }
    }

    pub(super) fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn user(&self, user_id: u64) -> Result<Option<User>> {
        get_json(&self.users, encode_user_key(user_id))
    }

    pub fn user_id_by_phone(&self, phone: &str) -> Result<Option<u64>> {
        match self.phones.get(encode_phone_key(phone))? {
            Some(value) => parse_user_id(&value).map(Some),
            None => Ok(None),
        }
    }

    pub fn transaction(&self, txn_id: u64) -> Result<Option<Transaction>> {
        get_json(&self.transactions, encode_txn_key(txn_id))
    }

    pub fn code(&self, code: &str) -> Result<Option<RedeemableCode>> {
        get_json(&self.codes, encode_code_key(code))
    }

    pub fn job(&self, job_id: &Uuid) -> Result<Option<Job>> {
        get_json(&self.jobs, encode_job_key(job_id))
    }

    /// A user's transactions, newest first
    pub fn transactions_for_user(
        &self,
        user_id: u64,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        let mut out = Vec::new();
        for item in self
            .user_transactions
            .prefix(encode_user_txn_prefix(user_id))
            .rev()
        {
            if limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
            let (key, _) = item?;
            let (_, txn_id) = decode_user_txn_key(&key)
                .ok_or_else(|| StoreError::Corrupt(String::from_utf8_lossy(&key).into_owned()))?;
            let txn = self
                .transaction(txn_id)?
                .ok_or_else(|| StoreError::Corrupt(format!("dangling transaction {txn_id}")))?;
            out.push(txn);
        }
        Ok(out)
    }

    /// A user's jobs, newest first
    pub fn jobs_for_user(&self, user_id: u64) -> Result<Vec<Job>> {
        let mut out = Vec::new();
        for item in self.user_jobs.prefix(encode_user_job_prefix(user_id)).rev() {
            let (key, _) = item?;
            let (_, job_id) = decode_user_job_key(&key)
                .ok_or_else(|| StoreError::Corrupt(String::from_utf8_lossy(&key).into_owned()))?;
            let job = self
                .job(&job_id)?
                .ok_or_else(|| StoreError::Corrupt(format!("dangling job {job_id}")))?;
            out.push(job);
        }
        Ok(out)
    }

    /// All user ids in ascending order
    pub fn user_ids(&self) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for item in self.users.keys() {
            let key = item?;
            let id = decode_user_key(&key)
                .ok_or_else(|| StoreError::Corrupt(String::from_utf8_lossy(&key).into_owned()))?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Jobs currently in `status`, oldest first
    pub fn jobs_in_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let mut out = Vec::new();
        for item in self.jobs.iter() {
            let (_, value) = item?;
            let job: Job = serde_json::from_slice(&value)?;
            if job.status == status {
                out.push(job);
            }
        }
        out.sort_by_key(|job| job.created_at);
        Ok(out)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Get internal statistics (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |partition: &PartitionHandle| -> Result<usize> {
            let mut n = 0;
            for item in partition.keys() {
                item?;
                n += 1;
            }
            Ok(n)
        };

        let stats = StoreStats {
            user_count: count(&self.users)?,
            transaction_count: count(&self.transactions)?,
            code_count: count(&self.codes)?,
            job_count: count(&self.jobs)?,
            locked_rows: self.locks.tracked(),
        };
        debug!(?stats, "Store stats collected");
        Ok(stats)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub user_count: usize,
    pub transaction_count: usize,
    pub code_count: usize,
    pub job_count: usize,
    pub locked_rows: usize,
}

pub(super) fn get_json<T: DeserializeOwned>(
    partition: &PartitionHandle,
    key: Vec<u8>,
) -> Result<Option<T>> {
    match partition.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
        None => Ok(None),
    }
}

pub(super) fn parse_user_id(value: &[u8]) -> Result<u64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Corrupt(String::from_utf8_lossy(value).into_owned()))
}

fn last_id(partition: &PartitionHandle, decode: fn(&[u8]) -> Option<u64>) -> Result<u64> {
    match partition.keys().next_back() {
        Some(key) => {
            let key = key?;
            decode(&key)
                .ok_or_else(|| StoreError::Corrupt(String::from_utf8_lossy(&key).into_owned()))
        }
        None => Ok(0),
    }
}
