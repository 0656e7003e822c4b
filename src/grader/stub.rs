//! In-process grader for development and tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Grader, GraderError, GradingRequest, Result, WorkerReport, WorkerState};

#[derive(Default)]
struct StubInner {
    enqueued: Mutex<Vec<GradingRequest>>,
    reports: Mutex<HashMap<String, WorkerReport>>,
    fail_enqueue: AtomicBool,
    fail_poll: AtomicBool,
    enqueue_delay_ms: AtomicUsize,
    next_task: AtomicUsize,
    polls: AtomicUsize,
}

/// Scripted grader: tasks stay `PENDING` until told otherwise
#[derive(Clone, Default)]
pub struct StubGrader {
    inner: Arc<StubInner>,
}

impl StubGrader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_enqueue(&self, fail: bool) {
        self.inner.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    pub fn fail_poll(&self, fail: bool) {
        self.inner.fail_poll.store(fail, Ordering::SeqCst);
    }

    pub fn set_enqueue_delay(&self, delay: Duration) {
        let ms = usize::try_from(delay.as_millis()).unwrap_or(usize::MAX);
        self.inner.enqueue_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Script what the status endpoint reports for `task_id`
    pub fn set_status(&self, task_id: &str, status: WorkerState, result: Option<Value>) {
        self.inner
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id.to_string(), WorkerReport { status, result });
    }

    pub fn enqueued(&self) -> Vec<GradingRequest> {
        self.inner
            .enqueued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn poll_count(&self) -> usize {
        self.inner.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Grader for StubGrader {
    async fn enqueue(&self, request: &GradingRequest) -> Result<String> {
        let delay = self.inner.enqueue_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        if self.inner.fail_enqueue.load(Ordering::SeqCst) {
            tracing::info!(job_id = %request.job_id, "Stub enqueue failing on request");
            return Err(GraderError::RequestFailed("stub enqueue failure".to_string()));
        }

        self.inner
            .enqueued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let n = self.inner.next_task.fetch_add(1, Ordering::SeqCst) + 1;
        let task_id = format!("task-{n}");
        tracing::info!(job_id = %request.job_id, %task_id, "Stub enqueue");
        Ok(task_id)
    }

    async fn poll_status(&self, task_id: &str) -> Result<WorkerReport> {
        self.inner.polls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_poll.load(Ordering::SeqCst) {
            return Err(GraderError::Timeout);
        }

        let report = self
            .inner
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned()
            .unwrap_or(WorkerReport {
                status: WorkerState::Pending,
                result: None,
            });
        Ok(report)
    }
}
