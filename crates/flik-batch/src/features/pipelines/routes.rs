//! Pipeline routes
//!
//! Launching a run answers `202 Accepted` with the run id; progress is read
//! back through `/runs/:run_id`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use flik_common::types::StartRunRequest;
use serde_json::json;
use uuid::Uuid;

use super::commands::{start_run::handle as handle_start_run, StartRunCommand};
use super::queries::{
    get_rate_limit::handle as handle_get_rate_limit, get_run::handle as handle_get_run,
    list_runs::handle as handle_list_runs, GetRateLimitQuery, GetRunQuery, ListRunsQuery,
};
use crate::error::AppError;
use crate::ingest::JobOrchestrator;

/// Create pipeline routes
pub fn pipelines_routes() -> Router<JobOrchestrator> {
    Router::new()
        .route("/pipelines/:kind/runs", post(start_run))
        .route("/runs", get(list_runs))
        .route("/runs/:run_id", get(get_run))
        .route("/rate-limit", get(get_rate_limit))
}

/// Launch a pipeline run
///
/// POST /pipelines/:kind/runs
async fn start_run(
    State(orchestrator): State<JobOrchestrator>,
    Path(kind): Path<String>,
    Json(request): Json<StartRunRequest>,
) -> Result<Response, AppError> {
    let command = StartRunCommand { kind, request };
    let handle = handle_start_run(orchestrator, command).await?;
    tracing::info!(run_id = %handle.run_id, job = %handle.job_name, "Run accepted");
    Ok((StatusCode::ACCEPTED, Json(json!(handle))).into_response())
}

/// GET /runs?job_name=enrichment&limit=20
async fn list_runs(
    State(orchestrator): State<JobOrchestrator>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Response, AppError> {
    let runs = handle_list_runs(orchestrator, query).await?;
    Ok((StatusCode::OK, Json(json!(runs))).into_response())
}

/// GET /runs/:run_id
async fn get_run(
    State(orchestrator): State<JobOrchestrator>,
    Path(run_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let status = handle_get_run(orchestrator, GetRunQuery { run_id }).await?;
    Ok((StatusCode::OK, Json(json!(status))).into_response())
}

/// GET /rate-limit
async fn get_rate_limit(State(orchestrator): State<JobOrchestrator>) -> Result<Response, AppError> {
    let status = handle_get_rate_limit(orchestrator, GetRateLimitQuery).await?;
    Ok((StatusCode::OK, Json(json!(status))).into_response())
}
