//! Thin HTTP surface (spec.md §6): status lookups and a manual replay
//! trigger. No dashboards or forms — operators use this alongside `opctl`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::error::{AppError, AppJsonResult};
use crate::orchestrator::ExecutionOrchestrator;
use crate::repository::Repository;
use crate::request_tracing;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub orchestrator: Arc<ExecutionOrchestrator>,
}

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: AppState) -> Router {
        Router::new()
            .route("/", get(|| async { "mail scheduling core" }))
            .route("/schedules/:id/status", get(schedule_status))
            .route("/schedules/:id/replay", post(replay_schedule))
            .layer(request_tracing::trace_with_request_id_layer())
            .layer(CorsLayer::permissive())
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "route does not exist")
}

#[derive(Serialize)]
struct ScheduleStatusResponse {
    schedule_id: i32,
    name: String,
    is_enabled: bool,
    next_execution_at: Option<DateTime<Utc>>,
    last_executed_at: Option<DateTime<Utc>>,
    total_executions: i64,
    total_emails_processed: i64,
    last_execution_status: Option<String>,
}

async fn schedule_status(State(state): State<AppState>, Path(id): Path<i32>) -> AppJsonResult<ScheduleStatusResponse> {
    let schedule = state
        .repository
        .find_schedule(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("schedule {id} not found")))?;
    let last_execution = state.repository.last_successful_execution(id).await?;

    Ok(Json(ScheduleStatusResponse {
        schedule_id: schedule.id,
        name: schedule.name,
        is_enabled: schedule.is_enabled,
        next_execution_at: schedule.next_execution_at.map(|t| t.with_timezone(&Utc)),
        last_executed_at: schedule.last_executed_at.map(|t| t.with_timezone(&Utc)),
        total_executions: schedule.total_executions,
        total_emails_processed: schedule.total_emails_processed,
        last_execution_status: last_execution.map(|e| format!("{:?}", e.status)),
    }))
}

/// Synchronously runs one execution for `id`, bypassing the dispatcher's
/// lock/tick cycle. Intended for operators re-running a failed schedule,
/// not for production traffic.
async fn replay_schedule(State(state): State<AppState>, Path(id): Path<i32>) -> Result<StatusCode, AppError> {
    let schedule = state
        .repository
        .find_schedule(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("schedule {id} not found")))?;

    state.orchestrator.run(&schedule, CancellationToken::new()).await?;
    Ok(StatusCode::ACCEPTED)
}
