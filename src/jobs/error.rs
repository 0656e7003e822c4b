use thiserror::Error;
use uuid::Uuid;

use crate::grader::GraderError;
use crate::ledger::LedgerError;
use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job {job_id} does not belong to user {user_id}")]
    Forbidden { job_id: Uuid, user_id: u64 },

    #[error("Invalid job input: {0}")]
    InvalidInput(String),

    #[error("Grader unavailable: {0}")]
    WorkerUnavailable(#[source] GraderError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, JobError>;
