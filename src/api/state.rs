use std::sync::Arc;

use crate::admin::AdminAdjustment;
use crate::codes::CodeRedemption;
use crate::config::Config;
use crate::grader::Grader;
use crate::jobs::{spawn_workers, Dispatcher, JobOrchestrator};
use crate::ledger::Ledger;
use crate::observability::Metrics;
use crate::storage::FjallStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<FjallStore>,
    pub ledger: Ledger,
    pub codes: CodeRedemption,
    pub admin: AdminAdjustment,
    pub jobs: JobOrchestrator,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire every component around one store handle and start the dispatch
    /// workers. Must be called from within a tokio runtime.
    pub fn new(config: Config, store: FjallStore, grader: Arc<dyn Grader>) -> Self {
        let store = Arc::new(store);
        let metrics = Arc::new(Metrics::new());
        let grader_timeout = config.grader.request_timeout.as_duration();

        let (dispatcher, receivers) =
            Dispatcher::new(config.dispatch.workers, config.dispatch.channel_size);
        spawn_workers(
            receivers,
            dispatcher.in_flight_tracker(),
            grader.clone(),
            store.clone(),
            metrics.clone(),
            grader_timeout,
        );

        let jobs = JobOrchestrator::new(
            store.clone(),
            Arc::new(dispatcher),
            grader,
            metrics.clone(),
            config.billing.submission_fee,
            grader_timeout,
        );

        Self {
            ledger: Ledger::new(store.clone()),
            codes: CodeRedemption::new(store.clone(), config.codes.settings()),
            admin: AdminAdjustment::new(store.clone()),
            jobs,
            store,
            metrics,
            config: Arc::new(config),
        }
    }
}
