//! Request and response bodies for the GradeBox HTTP API
//!
//! Every user-facing route identifies the caller through the
//! `X-Gradebox-User` header, which an upstream gateway sets after
//! authentication. Submission bodies are [`JobInput`] values tagged by `type`:
//!
//! ```json
//! { "type": "text", "content": "My essay...", "context": "IELTS task 2" }
//! { "type": "upload_batch", "batch_ref": "batch-7f3c", "prompt": "Grade these" }
//! ```
//!
//! Errors always use [`ErrorResponse`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::JobSummary;
use crate::ledger::{Reconciliation, Transaction};
use crate::observability::MetricsSnapshot;
use crate::storage::StoreStats;

pub use crate::codes::Redemption;
pub use crate::jobs::{JobInput, JobView, Submission};

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: u64,
    pub balance: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub initial_balance: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub user_id: u64,
    pub phone: Option<String>,
    pub balance: i64,
}

/// Exactly one of `user_id` and `phone` must be set
#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub phone: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdjustResponse {
    pub user_id: u64,
    pub balance: i64,
    pub transaction_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct GenerateCodesRequest {
    pub count: usize,
    pub points: i64,
    #[serde(default)]
    pub expire_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct GenerateCodesResponse {
    pub count: usize,
    pub points: i64,
    pub expires_at: DateTime<Utc>,
    pub codes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepQuery {
    /// e.g. `10m`; falls back to `dispatch.orphan_after`
    pub older_than: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    pub failed: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub consistent: bool,
    pub reports: Vec<Reconciliation>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub counters: MetricsSnapshot,
    pub store: StoreStats,
    pub dispatch_workers: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
