/// Fjall-based persistence with row locks and atomic units of work
///
/// Every component gets the same [`FjallStore`] handle. A mutation follows one
/// shape:
///
/// 1. lock the rows it will touch (`store.lock([...]).await`); the lock set
///    sorts keys so codes are always locked before users, users before jobs
/// 2. run the check-and-update inside `store.atomically(&locks, |unit| ...)`
/// 3. the unit commits its Fjall batch on `Ok`; on `Err` the batch is dropped
///    and nothing becomes visible
/// 4. the lock set is dropped after the commit
///
/// Locks are never held across calls to the grader.
///
/// ## Usage
///
/// ```rust,ignore
/// use gradebox::storage::{FjallStore, RowKey};
///
/// let store = FjallStore::open("data/gradebox")?;
/// let locks = store.lock([RowKey::User(7)]).await;
/// store.atomically(&locks, |unit| {
///     let user = unit.user_for_update(7)?;
///     // ...
/// })?;
/// ```

pub mod error;
pub mod locks;
pub mod partitions;
pub mod store;
pub mod unit;

pub use error::{Result, StoreError};
pub use locks::{LockSet, RowKey, RowLocks};
pub use store::{FjallStore, StoreStats, Table};
pub use unit::UnitOfWork;
