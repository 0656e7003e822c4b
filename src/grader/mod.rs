//! Boundary to the external grading worker
//!
//! The worker is slow and unreliable. Nothing in this crate holds a row lock
//! or an open unit of work while talking to it, and no call is retried.

pub mod http;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::jobs::JobInput;

pub use http::{HttpGrader, HttpGraderConfig};
pub use stub::StubGrader;

#[derive(Debug, Error)]
pub enum GraderError {
    #[error("Grader request timed out")]
    Timeout,

    #[error("Grader request failed: {0}")]
    RequestFailed(String),

    #[error("Grader returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid grader response: {0}")]
    InvalidResponse(String),

    #[error("Invalid grader URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, GraderError>;

/// Payload handed to the worker's enqueue endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingRequest {
    pub job_id: Uuid,
    pub input: JobInput,
}

/// Worker-side task state, as reported by its status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkerState {
    Queued,
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub status: WorkerState,
    #[serde(default)]
    pub result: Option<Value>,
}

#[async_trait]
pub trait Grader: Send + Sync {
    /// Submit work; returns the worker's task id
    async fn enqueue(&self, request: &GradingRequest) -> Result<String>;

    async fn poll_status(&self, task_id: &str) -> Result<WorkerReport>;
}
