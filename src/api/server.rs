use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::{services, state::AppState};
use crate::config::Config;
use crate::grader::HttpGrader;
use crate::storage::FjallStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All routes, with request tracing and transparent body decompression
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/points/balance", get(services::balance))
        .route("/points/transactions", get(services::transactions))
        .route("/points/redeem", post(services::redeem))
        .route(
            "/essays",
            post(services::submit_essay).get(services::list_essays),
        )
        .route("/essays/{job_id}", get(services::get_essay))
        .route("/admin/users", post(services::create_user))
        .route("/admin/adjust", post(services::adjust))
        .route("/admin/codes", post(services::generate_codes))
        .route("/admin/jobs/sweep", post(services::sweep_jobs))
        .route("/admin/ledger/reconcile", get(services::reconcile))
        .route("/operators/health", get(services::health))
        .route("/operators/metrics", get(services::metrics))
        .route("/health", get(services::health))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestDecompressionLayer::new()),
        )
}

/// Open the store, connect the grader client and serve until SIGINT/SIGTERM
pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    info!(path = %config.server.fjall_path.display(), "Opening Fjall store");
    let store = FjallStore::open(&config.server.fjall_path)
        .map_err(|e| format!("Failed to open Fjall store: {}", e))?;

    info!(base_url = %config.grader.base_url, "Connecting grader client");
    let grader = HttpGrader::new(config.grader.http_config())
        .map_err(|e| format!("Failed to build grader client: {}", e))?;

    info!(
        workers = config.dispatch.workers,
        channel_size = config.dispatch.channel_size,
        fee = config.billing.submission_fee,
        "Starting dispatch workers"
    );
    let state = AppState::new(config, store, Arc::new(grader));
    let store = state.store.clone();
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "GradeBox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.persist()?;
    info!("Store flushed, bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
