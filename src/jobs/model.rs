use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::ledger::Posting;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the grader is asked to work on. Opaque to this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobInput {
    Text {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    UploadBatch {
        batch_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
}

impl JobInput {
    pub fn kind(&self) -> &'static str {
        match self {
            JobInput::Text { .. } => "text",
            JobInput::UploadBatch { .. } => "upload_batch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: u64,
    pub input: JobInput,
    pub fee: i64,
    pub charge_transaction_id: u64,
    pub external_job_id: Option<String>,
    pub status: JobStatus,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of applying a terminal status to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
}

impl Job {
    /// Build the job paid for by `charge`. The store only accepts it
    /// together with that posting, inside the unit that produced it.
    pub fn charged(id: Uuid, input: JobInput, charge: &Posting) -> Self {
        let txn = charge.transaction();
        let now = Utc::now();
        Self {
            id,
            user_id: txn.user_id,
            input,
            fee: -txn.amount,
            charge_transaction_id: txn.id,
            external_job_id: None,
            status: JobStatus::Processing,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the worker's task id. Only the first write on a processing
    /// job sticks.
    pub fn attach_external_id(&mut self, external_id: impl Into<String>) -> bool {
        if self.external_job_id.is_some() || self.status.is_terminal() {
            return false;
        }
        self.external_job_id = Some(external_id.into());
        self.updated_at = Utc::now();
        true
    }

    /// Move a processing job to a terminal status. Terminal jobs never change.
    pub fn finish(&mut self, status: JobStatus, result: Value) -> Transition {
        if self.status.is_terminal() || !status.is_terminal() {
            return Transition::Unchanged;
        }
        self.status = status;
        self.result = Some(result);
        self.updated_at = Utc::now();
        Transition::Applied
    }

    pub fn view(&self) -> JobView {
        JobView {
            status: self.status,
            result: self.result.clone(),
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id,
            status: self.status,
            input_kind: self.input.kind(),
            fee: self.fee,
            result: self.result.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// What a caller sees when asking for a job's result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub status: JobStatus,
    pub result: Option<Value>,
}

impl JobView {
    pub fn processing() -> Self {
        Self {
            status: JobStatus::Processing,
            result: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub input_kind: &'static str,
    pub fee: i64,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
