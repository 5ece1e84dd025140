//! Route handlers for the worker's HTTP surface: `/solve`, `/health`,
//! `/metrics`, `/caps`, `/ready`.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use forge_core::{SolveResult, Task};
use serde_json::json;

use crate::config::WorkerType;
use crate::error::WorkerError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/solve", post(solve_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/caps", get(caps_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

async fn solve_handler(
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> Result<Json<SolveResult>, WorkerError> {
    match state.worker_type {
        WorkerType::Light => Ok(Json(solve_light(&state, &task))),
        WorkerType::Heavy => solve_heavy(&state, &task).await,
    }
}

/// Light tier: try every matching native skill; never touch the sandbox
/// or the gateway. Falls through to an explicit failure if nothing native
/// answers, matching scenario 1's contract without ever escalating.
fn solve_light(state: &AppState, task: &Task) -> SolveResult {
    let skills = state.kb.find(task);
    for skill in &skills {
        if let Some(result) = skill.try_solve_native(task) {
            if result.success {
                return result;
            }
        }
    }
    SolveResult::failure("no native skill in the knowledge base could solve this task")
}

async fn solve_heavy(state: &AppState, task: &Task) -> Result<Json<SolveResult>, WorkerError> {
    let solver = state
        .solver
        .as_ref()
        .ok_or_else(|| WorkerError::Internal("heavy worker has no solver configured".into()))?;

    match tokio::time::timeout(state.task_timeout, solver.solve(task)).await {
        Ok(result) => Ok(Json(result)),
        Err(_) => Ok(Json(SolveResult::failure(
            "worker-level task timeout exceeded before the solver returned",
        ))),
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "worker",
        "type": state.worker_type.as_str(),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let skills = state.kb.find(&Task::new("__metrics_probe__", serde_json::Value::Null));
    Json(json!({
        "worker_type": state.worker_type.as_str(),
        "kb_matches_for_probe": skills.len(),
    }))
}

async fn caps_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "worker_type": state.worker_type.as_str(),
        "capabilities": state.capabilities(),
        "capabilities_string": state.capabilities_string(),
    }))
}

async fn ready_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let ready = state.worker_type != WorkerType::Heavy || state.solver.is_some();
    Json(json!({
        "status": if ready { "ready" } else { "unready" },
        "worker_type": state.worker_type.as_str(),
        "ready": ready,
    }))
}
