use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, info};

use super::{
    models::{
        AdjustRequest, AdjustResponse, BalanceResponse, CreateUserRequest, CreateUserResponse,
        GenerateCodesRequest, GenerateCodesResponse, HealthResponse, HistoryQuery, JobInput,
        JobsResponse, MetricsResponse, ReconcileResponse, RedeemRequest, SweepQuery,
        SweepResponse, TransactionsResponse,
    },
    state::AppState,
    utils::{read_json, user_id},
    validation::{adjust_target, history_limit, parse_job_id, sweep_age},
};
use crate::api::error::ApiError;

fn body_limit(state: &AppState) -> usize {
    state.config.server.api.max_body_bytes.as_usize()
}

/// Current balance (GET /points/balance)
pub async fn balance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let balance = state.ledger.balance(user_id)?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

/// Newest-first transaction log (GET /points/transactions?limit=N)
pub async fn transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let limit = history_limit(query.limit, state.config.server.api.max_history)?;
    let transactions = state.ledger.history(user_id, Some(limit))?;
    Ok(Json(TransactionsResponse { transactions }))
}

/// Redeem a single-use code (POST /points/redeem)
pub async fn redeem(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let request: RedeemRequest = read_json(&headers, body, body_limit(&state)).await?;

    let redemption = state.codes.redeem(user_id, &request.code).await?;
    state.metrics.code_redeemed();
    Ok(Json(redemption))
}

/// Charge the submission fee and queue the essay for grading (POST /essays)
///
/// Returns 202 as soon as the charge and the job row are committed. The hand-off
/// to the grader happens afterwards on a dispatch worker; if it fails, the job
/// turns `failed` and the fee stays charged.
pub async fn submit_essay(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let input: JobInput = read_json(&headers, body, body_limit(&state)).await?;

    let submission = state.jobs.submit(user_id, input).await?;
    Ok((StatusCode::ACCEPTED, Json(submission)))
}

/// The caller's jobs, newest first (GET /essays)
pub async fn list_essays(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let jobs = state.jobs.history(user_id)?;
    Ok(Json(JobsResponse { jobs }))
}

/// Job status and result (GET /essays/{job_id})
///
/// Terminal jobs are answered from the store. Processing jobs with a task id
/// are polled on the grader; a grader outage is a 502 and leaves the job as is.
pub async fn get_essay(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let job_id = parse_job_id(&job_id)?;

    let view = state.jobs.get_result(user_id, job_id).await?;
    debug!(%job_id, status = %view.status, "Result served");
    Ok(Json(view))
}

/// Register a user (POST /admin/users)
pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: CreateUserRequest = read_json(&headers, body, body_limit(&state)).await?;

    let user = state
        .ledger
        .create_user(request.phone, request.initial_balance)
        .await?;
    let response = CreateUserResponse {
        user_id: user.id,
        phone: user.phone,
        balance: user.balance,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Manual balance correction (POST /admin/adjust)
pub async fn adjust(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: AdjustRequest = read_json(&headers, body, body_limit(&state)).await?;
    let target = adjust_target(&request)?;

    let adjustment = state
        .admin
        .adjust(target, request.amount, request.reason.as_deref())
        .await?;
    state.metrics.adjustment_made();

    Ok(Json(AdjustResponse {
        user_id: adjustment.user_id,
        balance: adjustment.balance,
        transaction_id: adjustment.transaction.id,
    }))
}

/// Mint a batch of codes (POST /admin/codes)
pub async fn generate_codes(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let request: GenerateCodesRequest = read_json(&headers, body, body_limit(&state)).await?;

    let generated = state
        .codes
        .generate(request.count, request.points, request.expire_days)
        .await?;
    let response = GenerateCodesResponse {
        count: generated.codes.len(),
        points: generated.points,
        expires_at: generated.expires_at,
        codes: generated.codes,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Fail processing jobs that never received a task id (POST /admin/jobs/sweep)
pub async fn sweep_jobs(
    State(state): State<AppState>,
    Query(query): Query<SweepQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let age = sweep_age(
        query.older_than.as_deref(),
        state.config.dispatch.orphan_after.as_duration(),
    )?;

    let failed = state.jobs.sweep_orphans(age).await?;
    info!(count = failed.len(), ?age, "Orphan sweep requested");
    Ok(Json(SweepResponse { failed }))
}

/// Replay every user's log against their balance (GET /admin/ledger/reconcile)
pub async fn reconcile(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let reports = state.ledger.reconcile_all().await?;
    let consistent = reports.iter().all(|r| r.consistent);
    Ok(Json(ReconcileResponse {
        consistent,
        reports,
    }))
}

/// Health check endpoint (GET /health)
///
/// Returns 503 Service Unavailable if the store cannot be read or a dispatch
/// worker has stopped.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    components.insert("api".to_string(), "healthy".to_string());
    let fjall = match state.store.stats() {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };
    components.insert("fjall".to_string(), fjall.to_string());
    let dispatcher = if state.jobs.dispatcher().health_check() {
        "healthy"
    } else {
        "unhealthy"
    };
    components.insert("dispatcher".to_string(), dispatcher.to_string());

    let all_healthy = components.values().all(|status| status == "healthy");
    let (status_code, overall_status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

/// In-process counters (GET /operators/metrics)
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let store = state
        .store
        .stats()
        .map_err(|e| ApiError::Internal(format!("Failed to read store stats: {e}")))?;

    Ok(Json(MetricsResponse {
        counters: state.metrics.snapshot(),
        store,
        dispatch_workers: state.jobs.dispatcher().num_workers(),
    }))
}
