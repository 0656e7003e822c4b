use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Row {0} written without holding its lock")]
    LockNotHeld(String),

    #[error("Job {0} is not backed by a charge posted in the same unit of work")]
    UnchargedJob(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
