use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::grader::{Grader, GraderError, GradingRequest, WorkerState};
use crate::ledger::{debit_in, LedgerError};
use crate::observability::Metrics;
use crate::storage::{FjallStore, RowKey};

use super::dispatch::{record_dispatch_failure, Dispatcher};
use super::error::{JobError, Result};
use super::lifecycle::{finish, finish_if};
use super::model::{Job, JobInput, JobStatus, JobSummary, JobView, Transition};

pub const SUBMISSION_DESCRIPTION: &str = "Essay submission deduction";

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job_id: Uuid,
    pub balance: i64,
}

/// Ties submissions to their charge and drives jobs to a terminal state
///
/// `submit` debits the fee and inserts the job in one unit of work, then hands
/// the job to the [`Dispatcher`] after the commit. `get_result` serves
/// terminal jobs from the store and polls the grader for the rest.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<FjallStore>,
    dispatcher: Arc<Dispatcher>,
    grader: Arc<dyn Grader>,
    metrics: Arc<Metrics>,
    fee: i64,
    poll_timeout: Duration,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<FjallStore>,
        dispatcher: Arc<Dispatcher>,
        grader: Arc<dyn Grader>,
        metrics: Arc<Metrics>,
        fee: i64,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            grader,
            metrics,
            fee,
            poll_timeout,
        }
    }

    pub fn fee(&self) -> i64 {
        self.fee
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn submit(&self, user_id: u64, input: JobInput) -> Result<Submission> {
        validate_input(&input)?;

        let job_id = Uuid::now_v7();
        let locks = self
            .store
            .lock([RowKey::User(user_id), RowKey::Job(job_id)])
            .await;

        let (job, balance) = self.store.atomically(&locks, |unit| -> Result<(Job, i64)> {
            let charge = debit_in(unit, user_id, self.fee, SUBMISSION_DESCRIPTION)?;
            let job = Job::charged(job_id, input, &charge);
            unit.insert_job(&job, &charge)?;
            Ok((job, charge.balance()))
        })?;
        drop(locks);

        self.metrics.job_submitted();
        info!(user_id, %job_id, fee = self.fee, balance, "Job submitted");

        let request = GradingRequest {
            job_id,
            input: job.input,
        };
        if let Err(e) = self.dispatcher.dispatch(request) {
            warn!(%job_id, error = %e, "Could not hand job to dispatcher");
            record_dispatch_failure(&self.store, &self.metrics, job_id).await;
        }

        Ok(Submission { job_id, balance })
    }

    pub async fn get_result(&self, user_id: u64, job_id: Uuid) -> Result<JobView> {
        let job = self.store.job(&job_id)?.ok_or(JobError::NotFound(job_id))?;
        if job.user_id != user_id {
            return Err(JobError::Forbidden { job_id, user_id });
        }
        if job.status.is_terminal() {
            debug!(%job_id, status = %job.status, "Serving stored result");
            return Ok(job.view());
        }
        let Some(task_id) = job.external_job_id.as_deref() else {
            return Ok(JobView::processing());
        };

        self.metrics.result_polled();
        let report = match tokio::time::timeout(self.poll_timeout, self.grader.poll_status(task_id))
            .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(%job_id, task_id, error = %e, "Grader poll failed");
                return Err(JobError::WorkerUnavailable(e));
            }
            Err(_) => {
                warn!(%job_id, task_id, "Grader poll timed out");
                return Err(JobError::WorkerUnavailable(GraderError::Timeout));
            }
        };

        let (status, result) = match report.status {
            WorkerState::Success => (
                JobStatus::Completed,
                report.result.unwrap_or_else(|| json!({})),
            ),
            WorkerState::Failure => (
                JobStatus::Failed,
                report
                    .result
                    .unwrap_or_else(|| json!({ "error": "grading failed" })),
            ),
            other => {
                debug!(%job_id, task_id, state = ?other, "Job still processing");
                return Ok(JobView::processing());
            }
        };

        let (stored, transition) = finish(&self.store, job_id, status, result).await?;
        if transition == Transition::Applied {
            self.count_terminal(stored.status);
            info!(%job_id, status = %stored.status, "Job finished from grader report");
        }
        Ok(stored.view())
    }

    /// The user's jobs, newest first
    pub fn history(&self, user_id: u64) -> Result<Vec<JobSummary>> {
        if self.store.user(user_id)?.is_none() {
            return Err(LedgerError::UserNotFound(user_id).into());
        }
        Ok(self
            .store
            .jobs_for_user(user_id)?
            .iter()
            .map(Job::summary)
            .collect())
    }

    /// Fail processing jobs that never got a task id, are older than
    /// `older_than` and are not held by a dispatch worker. Operator-triggered;
    /// the fee is not refunded.
    pub async fn sweep_orphans(&self, older_than: Duration) -> Result<Vec<Uuid>> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| JobError::InvalidInput(format!("sweep age out of range: {e}")))?;
        let cutoff = Utc::now() - age;

        let mut swept = Vec::new();
        for job in self.store.jobs_in_status(JobStatus::Processing)? {
            if job.external_job_id.is_some() || job.created_at >= cutoff {
                continue;
            }
            if self.dispatcher.in_flight(&job.id) {
                debug!(job_id = %job.id, "Skipping job with dispatch in flight");
                continue;
            }
            // Workers write the outcome before leaving the in-flight set, so
            // rechecking both under the job lock closes the race.
            let (_, transition) = finish_if(
                &self.store,
                job.id,
                JobStatus::Failed,
                dispatch_lost_result(),
                |fresh| fresh.external_job_id.is_none() && !self.dispatcher.in_flight(&fresh.id),
            )
            .await?;
            if transition == Transition::Applied {
                self.metrics.job_failed();
                swept.push(job.id);
            }
        }

        info!(count = swept.len(), cutoff = %cutoff, "Orphan sweep finished");
        Ok(swept)
    }

    fn count_terminal(&self, status: JobStatus) {
        match status {
            JobStatus::Completed => self.metrics.job_completed(),
            JobStatus::Failed => self.metrics.job_failed(),
            JobStatus::Processing => {}
        }
    }
}

fn dispatch_lost_result() -> Value {
    json!({ "error": "dispatch lost" })
}

fn validate_input(input: &JobInput) -> Result<()> {
    match input {
        JobInput::Text { content, .. } if content.trim().is_empty() => {
            Err(JobError::InvalidInput("content must not be empty".to_string()))
        }
        JobInput::UploadBatch { batch_ref, .. } if batch_ref.trim().is_empty() => {
            Err(JobError::InvalidInput("batch_ref must not be empty".to_string()))
        }
        _ => Ok(()),
    }
}
