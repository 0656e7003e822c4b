//! Tracing setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(format: LogFormat, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Counters exposed on `/operators/metrics`
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_submitted: AtomicU64,
    jobs_dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
    results_polled: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    codes_redeemed: AtomicU64,
    adjustments: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_submitted", "Metric incremented");
    }

    pub fn job_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_dispatched", "Metric incremented");
    }

    pub fn dispatch_failed(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "dispatch_failures", "Metric incremented");
    }

    pub fn result_polled(&self) {
        self.results_polled.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "results_polled", "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_completed", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    pub fn code_redeemed(&self) {
        self.codes_redeemed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "codes_redeemed", "Metric incremented");
    }

    pub fn adjustment_made(&self) {
        self.adjustments.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "adjustments", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            results_polled: self.results_polled.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            codes_redeemed: self.codes_redeemed.load(Ordering::Relaxed),
            adjustments: self.adjustments.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_dispatched: u64,
    pub dispatch_failures: u64,
    pub results_polled: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub codes_redeemed: u64,
    pub adjustments: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment_independently() {
        let metrics = Metrics::new();
        metrics.job_submitted();
        metrics.job_submitted();
        metrics.dispatch_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.jobs_submitted, 2);
        assert_eq!(snap.dispatch_failures, 1);
        assert_eq!(snap.jobs_completed, 0);
    }

    #[test]
    fn test_snapshot_serializes_by_name() {
        let metrics = Metrics::new();
        metrics.code_redeemed();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["codes_redeemed"], 1);
        assert_eq!(json["adjustments"], 0);
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_tracing(LogFormat::Text, "info");
        init_tracing(LogFormat::Json, "debug");
    }
}
