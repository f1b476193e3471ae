use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use engine::TimelinePlan;
use serde::Serialize;
use std::sync::Arc;

use crate::jobs::{RunManager, RunStatus};
use crate::pipeline::RunRequest;

#[derive(Serialize)]
pub struct CreateRunResponse {
    run_id: String,
}

#[derive(Serialize)]
pub struct RunResponse {
    id: String,
    status: RunStatus,
    progress: f64,
    plan: Option<TimelinePlan>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
pub struct CancelResponse {
    cancelled: bool,
}

pub fn router(runs: Arc<RunManager>) -> Router {
    Router::new()
        .route("/", post(create_run))
        .route("/:id", get(get_run))
        .route("/:id/cancel", post(cancel_run))
        .with_state(runs)
}

async fn create_run(
    State(runs): State<Arc<RunManager>>,
    Json(request): Json<RunRequest>,
) -> Result<(StatusCode, Json<CreateRunResponse>), StatusCode> {
    if request.script.segments.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if request
        .audio_duration
        .is_some_and(|d| !(d.is_finite() && d > 0.0))
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let run_id = runs.create_run(&request).map_err(|e| {
        tracing::error!("[API] failed to queue run: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok((StatusCode::ACCEPTED, Json(CreateRunResponse { run_id })))
}

async fn get_run(
    State(runs): State<Arc<RunManager>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, StatusCode> {
    let run = runs
        .get_run(&id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(RunResponse {
        id: run.id,
        status: run.status,
        progress: run.progress,
        plan: run.plan,
        error: run.error,
        created_at: run.created_at.to_rfc3339(),
        updated_at: run.updated_at.to_rfc3339(),
    }))
}

async fn cancel_run(
    State(runs): State<Arc<RunManager>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, StatusCode> {
    if runs
        .get_run(&id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .is_none()
    {
        return Err(StatusCode::NOT_FOUND);
    }
    let cancelled = runs
        .cancel(&id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(CancelResponse { cancelled }))
}
