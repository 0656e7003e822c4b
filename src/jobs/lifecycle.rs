//! Persisted job transitions
//!
//! Each helper locks the job row, re-reads the job and applies its change to
//! the stored copy, so a transition computed from a stale read can never
//! overwrite a state some other writer already committed.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{FjallStore, RowKey};

use super::error::{JobError, Result};
use super::model::{Job, JobStatus, Transition};

/// Record the worker task id for a job. Returns false when the job already
/// had one or is no longer processing; the stored value is kept.
pub async fn mark_dispatched(store: &FjallStore, job_id: Uuid, task_id: &str) -> Result<bool> {
    let locks = store.lock([RowKey::Job(job_id)]).await;
    let (attached, job) = store.atomically(&locks, |unit| -> Result<(bool, Job)> {
        let mut job = unit.job_for_update(&job_id)?.ok_or(JobError::NotFound(job_id))?;
        let attached = job.attach_external_id(task_id);
        if attached {
            unit.put_job(&job)?;
        }
        Ok((attached, job))
    })?;

    if attached {
        debug!(%job_id, task_id, "External task id recorded");
    } else if job.status.is_terminal() {
        warn!(%job_id, task_id, status = %job.status, "Dropping task id, job already terminal");
    } else {
        warn!(
            %job_id,
            task_id,
            existing = job.external_job_id.as_deref(),
            "Ignoring second external task id for job"
        );
    }
    Ok(attached)
}

/// Move a job to a terminal status, unless it is terminal already.
/// Returns the stored job and whether this call changed it.
pub async fn finish(
    store: &FjallStore,
    job_id: Uuid,
    status: JobStatus,
    result: Value,
) -> Result<(Job, Transition)> {
    finish_if(store, job_id, status, result, |_| true).await
}

/// Mark a job failed, typically after its dispatch went wrong
pub async fn mark_failed(
    store: &FjallStore,
    job_id: Uuid,
    result: Value,
) -> Result<(Job, Transition)> {
    finish(store, job_id, JobStatus::Failed, result).await
}

/// Like [`finish`], but only when `guard` accepts the freshly read job
pub async fn finish_if<G>(
    store: &FjallStore,
    job_id: Uuid,
    status: JobStatus,
    result: Value,
    guard: G,
) -> Result<(Job, Transition)>
where
    G: FnOnce(&Job) -> bool,
{
    let locks = store.lock([RowKey::Job(job_id)]).await;
    let outcome = store.atomically(&locks, |unit| -> Result<(Job, Transition)> {
        let mut job = unit.job_for_update(&job_id)?.ok_or(JobError::NotFound(job_id))?;
        if !guard(&job) {
            return Ok((job, Transition::Unchanged));
        }
        let transition = job.finish(status, result);
        if transition == Transition::Applied {
            unit.put_job(&job)?;
        }
        Ok((job, transition))
    })?;

    match outcome.1 {
        Transition::Applied => debug!(%job_id, %status, "Job finished"),
        Transition::Unchanged => debug!(
            %job_id,
            stored = %outcome.0.status,
            requested = %status,
            "Job transition skipped"
        ),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::jobs::JobInput;
    use crate::ledger::{debit_in, Ledger};

    async fn charged_job(store: &FjallStore, ledger: &Ledger) -> Uuid {
        let user_id = ledger.create_user(None, 10).await.unwrap().id;
        let job_id = Uuid::now_v7();
        let locks = store.lock([RowKey::User(user_id), RowKey::Job(job_id)]).await;
        store
            .atomically(&locks, |unit| -> Result<()> {
                let charge = debit_in(unit, user_id, 10, "fee")?;
                let input = JobInput::Text {
                    content: "essay".to_string(),
                    context: None,
                };
                unit.insert_job(&Job::charged(job_id, input, &charge), &charge)?;
                Ok(())
            })
            .unwrap();
        job_id
    }

    #[tokio::test]
    async fn test_first_task_id_wins() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FjallStore::open(temp_dir.path().join("lifecycle")).unwrap());
        let ledger = Ledger::new(store.clone());
        let job_id = charged_job(&store, &ledger).await;

        assert!(mark_dispatched(&store, job_id, "task-1").await.unwrap());
        assert!(!mark_dispatched(&store, job_id, "task-2").await.unwrap());

        let job = store.job(&job_id).unwrap().unwrap();
        assert_eq!(job.external_job_id.as_deref(), Some("task-1"));
    }

    #[tokio::test]
    async fn test_task_id_for_terminal_job_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FjallStore::open(temp_dir.path().join("lifecycle")).unwrap());
        let ledger = Ledger::new(store.clone());
        let job_id = charged_job(&store, &ledger).await;

        let (_, transition) = mark_failed(&store, job_id, json!({"error": "dispatch lost"}))
            .await
            .unwrap();
        assert_eq!(transition, Transition::Applied);
        assert!(!mark_dispatched(&store, job_id, "task-1").await.unwrap());

        let job = store.job(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.external_job_id.is_none());
        assert_eq!(job.result, Some(json!({"error": "dispatch lost"})));
    }
}
