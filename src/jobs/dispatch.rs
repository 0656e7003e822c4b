use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::grader::{Grader, GradingRequest};
use crate::observability::Metrics;
use crate::storage::FjallStore;

use super::lifecycle::{mark_dispatched, mark_failed};
use super::model::Transition;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatch queue for worker {0} is full")]
    QueueFull(usize),

    #[error("Dispatch worker {0} has stopped")]
    Closed(usize),
}

/// Result stored on a job whose hand-off to the grader failed
pub fn dispatch_failed_result() -> serde_json::Value {
    json!({ "error": "dispatch failed" })
}

/// Job ids handed to a worker whose outcome is not recorded yet
#[derive(Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<Uuid>>>,
}

impl InFlight {
    fn insert(&self, job_id: Uuid) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id);
    }

    fn remove(&self, job_id: &Uuid) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
    }

    pub fn contains(&self, job_id: &Uuid) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(job_id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hands committed jobs to the dispatch workers
///
/// Architecture:
/// 1. `submit` commits the debit and the job, then calls `dispatch`
/// 2. `dispatch` picks the next worker round-robin and `try_send`s; it never
///    waits, so a slow grader cannot hold up the request
/// 3. each worker calls the grader's `enqueue` with a bounded timeout and
///    writes the outcome back to the job: the task id, or `failed`
///
/// A job stays in the [`InFlight`] set from the `try_send` until its worker
/// has written the outcome, so the orphan sweep can leave it alone.
pub struct Dispatcher {
    worker_channels: Vec<mpsc::Sender<GradingRequest>>,
    next_worker: AtomicUsize,
    in_flight: InFlight,
}

impl Dispatcher {
    /// Returns the dispatcher and one receiver per worker
    pub fn new(
        num_workers: usize,
        channel_size: usize,
    ) -> (Self, Vec<mpsc::Receiver<GradingRequest>>) {
        let num_workers = num_workers.max(1);
        info!(num_workers, channel_size, "Creating dispatcher with worker channels");

        let mut worker_channels = Vec::with_capacity(num_workers);
        let mut worker_receivers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::channel(channel_size.max(1));
            worker_channels.push(tx);
            worker_receivers.push(rx);
            debug!(worker_id, "Created dispatch channel");
        }

        let dispatcher = Self {
            worker_channels,
            next_worker: AtomicUsize::new(0),
            in_flight: InFlight::default(),
        };
        (dispatcher, worker_receivers)
    }

    pub fn dispatch(&self, request: GradingRequest) -> Result<(), DispatchError> {
        let worker_idx =
            self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();
        let job_id = request.job_id;

        // Inserted before the send so the worker can never remove it first.
        self.in_flight.insert(job_id);
        match self.worker_channels[worker_idx].try_send(request) {
            Ok(()) => {
                debug!(%job_id, worker_idx, "Job handed to dispatch worker");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.in_flight.remove(&job_id);
                warn!(%job_id, worker_idx, "Dispatch queue full");
                Err(DispatchError::QueueFull(worker_idx))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.in_flight.remove(&job_id);
                warn!(%job_id, worker_idx, "Dispatch worker channel closed");
                Err(DispatchError::Closed(worker_idx))
            }
        }
    }

    /// True while a worker holds the job and has not recorded its outcome
    pub fn in_flight(&self, job_id: &Uuid) -> bool {
        self.in_flight.contains(job_id)
    }

    /// Shared handle the workers use to release finished jobs
    pub fn in_flight_tracker(&self) -> InFlight {
        self.in_flight.clone()
    }

    pub fn num_workers(&self) -> usize {
        self.worker_channels.len()
    }

    /// Check if all worker channels are healthy (not closed)
    pub fn health_check(&self) -> bool {
        self.worker_channels.iter().all(|ch| !ch.is_closed())
    }
}

/// Spawn one task per receiver. Each task exits when its channel closes.
pub fn spawn_workers(
    receivers: Vec<mpsc::Receiver<GradingRequest>>,
    in_flight: InFlight,
    grader: Arc<dyn Grader>,
    store: Arc<FjallStore>,
    metrics: Arc<Metrics>,
    enqueue_timeout: Duration,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(worker_id, rx)| {
            tokio::spawn(run_worker(
                worker_id,
                rx,
                in_flight.clone(),
                grader.clone(),
                store.clone(),
                metrics.clone(),
                enqueue_timeout,
            ))
        })
        .collect()
}

async fn run_worker(
    worker_id: usize,
    mut rx: mpsc::Receiver<GradingRequest>,
    in_flight: InFlight,
    grader: Arc<dyn Grader>,
    store: Arc<FjallStore>,
    metrics: Arc<Metrics>,
    enqueue_timeout: Duration,
) {
    debug!(worker_id, "Dispatch worker started");

    while let Some(request) = rx.recv().await {
        let job_id = request.job_id;
        let outcome = tokio::time::timeout(enqueue_timeout, grader.enqueue(&request)).await;

        match outcome {
            Ok(Ok(task_id)) => match mark_dispatched(&store, job_id, &task_id).await {
                Ok(true) => {
                    metrics.job_dispatched();
                    info!(worker_id, %job_id, %task_id, "Job dispatched");
                }
                Ok(false) => {}
                Err(e) => error!(worker_id, %job_id, error = %e, "Failed to record task id"),
            },
            Ok(Err(e)) => {
                warn!(worker_id, %job_id, error = %e, "Grader rejected job");
                record_dispatch_failure(&store, &metrics, job_id).await;
            }
            Err(_) => {
                warn!(worker_id, %job_id, timeout = ?enqueue_timeout, "Grader enqueue timed out");
                record_dispatch_failure(&store, &metrics, job_id).await;
            }
        }
        in_flight.remove(&job_id);
    }

    debug!(worker_id, "Dispatch worker stopped");
}

/// Fail the job after a lost hand-off. The fee stays charged.
pub async fn record_dispatch_failure(store: &FjallStore, metrics: &Metrics, job_id: Uuid) {
    metrics.dispatch_failed();
    match mark_failed(store, job_id, dispatch_failed_result()).await {
        Ok((_, Transition::Applied)) => metrics.job_failed(),
        Ok((job, Transition::Unchanged)) => {
            debug!(%job_id, status = %job.status, "Job already terminal after dispatch failure")
        }
        Err(e) => error!(%job_id, error = %e, "Failed to mark job as failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobInput;

    fn request(n: usize) -> GradingRequest {
        GradingRequest {
            job_id: Uuid::now_v7(),
            input: JobInput::Text {
                content: format!("essay {n}"),
                context: None,
            },
        }
    }

    #[tokio::test]
    async fn test_round_robin_distribution() {
        let (dispatcher, mut receivers) = Dispatcher::new(3, 10);

        let mut sent = Vec::new();
        for i in 0..6 {
            let req = request(i);
            sent.push(req.job_id);
            dispatcher.dispatch(req).unwrap();
        }

        // Worker 0 gets requests 0 and 3, worker 1 gets 1 and 4, and so on.
        for worker_id in 0..3 {
            let first = receivers[worker_id].recv().await.unwrap();
            let second = receivers[worker_id].recv().await.unwrap();
            assert_eq!(first.job_id, sent[worker_id]);
            assert_eq!(second.job_id, sent[worker_id + 3]);
        }
    }

    #[tokio::test]
    async fn test_full_queue_is_reported_without_waiting() {
        let (dispatcher, _receivers) = Dispatcher::new(1, 1);

        dispatcher.dispatch(request(0)).unwrap();
        let err = dispatcher.dispatch(request(1)).unwrap_err();
        assert!(matches!(err, DispatchError::QueueFull(0)));
    }

    #[tokio::test]
    async fn test_in_flight_tracks_queued_jobs() {
        let (dispatcher, _receivers) = Dispatcher::new(1, 1);

        let queued = request(0);
        let queued_id = queued.job_id;
        dispatcher.dispatch(queued).unwrap();
        assert!(dispatcher.in_flight(&queued_id));

        // A rejected send never stays in flight.
        let rejected = request(1);
        let rejected_id = rejected.job_id;
        assert!(dispatcher.dispatch(rejected).is_err());
        assert!(!dispatcher.in_flight(&rejected_id));
        assert_eq!(dispatcher.in_flight_tracker().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_worker_is_reported() {
        let (dispatcher, receivers) = Dispatcher::new(1, 4);
        drop(receivers);

        assert!(!dispatcher.health_check());
        let err = dispatcher.dispatch(request(0)).unwrap_err();
        assert!(matches!(err, DispatchError::Closed(0)));
    }
}
