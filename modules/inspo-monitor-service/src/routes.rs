//! Axum route handlers for the inspo monitor RPC API.

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use inspo_monitor_types::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub account: String,
    pub store_backend: String,
    pub start_time: Instant,
    pub last_tick_at: Arc<Mutex<Option<String>>>,
    pub poll_interval_secs: u64,
}

fn error_status(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::Auth(_) => StatusCode::UNAUTHORIZED,
        PipelineError::Precondition(_) => StatusCode::CONFLICT,
        PipelineError::MalformedData(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Store(_) | PipelineError::Network(_) | PipelineError::Api(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn respond<T: Serialize>(
    result: crate::error::Result<T>,
) -> (StatusCode, Json<RpcResponse<T>>) {
    match result {
        Ok(data) => (StatusCode::OK, Json(RpcResponse::ok(data))),
        Err(e) => (error_status(&e), Json(RpcResponse::err(e.to_string()))),
    }
}

// =====================================================
// Pipeline Endpoints
// =====================================================

// POST /rpc/monitor/run
pub async fn monitor_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MonitorRequest>,
) -> (StatusCode, Json<RpcResponse<MonitorOutcome>>) {
    let account = req.account.unwrap_or_else(|| state.account.clone());
    respond(state.pipeline.run_monitor_cycle(&account).await)
}

// POST /rpc/backfill/run
pub async fn backfill_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BackfillRequest>,
) -> (StatusCode, Json<RpcResponse<BackfillOutcome>>) {
    respond(
        state
            .pipeline
            .backfill_account(&req.account, req.target, req.page_size)
            .await,
    )
}

// POST /rpc/impressions/refresh
pub async fn impressions_refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> (StatusCode, Json<RpcResponse<RefreshOutcome>>) {
    respond(state.pipeline.refresh_impressions(req.max_items).await)
}

// POST /rpc/thread/generate
pub async fn thread_generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ThreadRequest>,
) -> (StatusCode, Json<RpcResponse<ThreadOutcome>>) {
    respond(state.pipeline.synthesize_thread(&req.account).await)
}

// =====================================================
// Read Endpoints
// =====================================================

// GET /rpc/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<PipelineStats>>) {
    respond(state.pipeline.pipeline_stats().await)
}

// GET /rpc/impressions
pub async fn impressions(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<ImpressionsReport>>) {
    respond(state.pipeline.impressions_report().await)
}

// GET /rpc/status
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<ServiceStatus>>) {
    let last_tick = state.last_tick_at.lock().await.clone();
    let status = ServiceStatus {
        running: true,
        uptime_secs: state.start_time.elapsed().as_secs(),
        monitored_account: state.account.clone(),
        store_backend: state.store_backend.clone(),
        last_tick_at: last_tick,
        poll_interval_secs: state.poll_interval_secs,
    };
    (StatusCode::OK, Json(RpcResponse::ok(status)))
}

// =====================================================
// Admin Endpoints
// =====================================================

// POST /rpc/admin/reset-cursor
pub async fn admin_reset_cursor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccountRequest>,
) -> (StatusCode, Json<RpcResponse<bool>>) {
    respond(state.pipeline.reset_cursor(&req.account).await.map(|_| true))
}

// POST /rpc/admin/clear-thread
pub async fn admin_clear_thread(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccountRequest>,
) -> (StatusCode, Json<RpcResponse<bool>>) {
    respond(state.pipeline.clear_thread(&req.account).await.map(|_| true))
}

// POST /rpc/admin/clear-backfill
pub async fn admin_clear_backfill(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccountRequest>,
) -> (StatusCode, Json<RpcResponse<usize>>) {
    respond(state.pipeline.clear_backfill(&req.account).await)
}

// POST /rpc/admin/cleanup
pub async fn admin_cleanup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CleanupRequest>,
) -> (StatusCode, Json<RpcResponse<usize>>) {
    respond(state.pipeline.cleanup_processed(req.keep_latest).await)
}

// POST /rpc/admin/repair
pub async fn admin_repair(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<RepairOutcome>>) {
    respond(state.pipeline.repair_processed_posts().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_distinct_statuses() {
        assert_eq!(
            error_status(&PipelineError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            error_status(&PipelineError::Auth("x".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            error_status(&PipelineError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&PipelineError::Precondition("x".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_status(&PipelineError::Api("x".to_string())),
            StatusCode::BAD_GATEWAY
        );
    }
}
