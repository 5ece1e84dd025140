//! HTTP-facing error taxonomy for the worker binary. Every handler returns
//! `Result<Json<Value>, WorkerError>`; `IntoResponse` maps each variant to
//! the status code the error-handling taxonomy assigns it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_core::ErrorHint;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("request body was not a valid Task: {0}")]
    InvalidTask(String),

    #[error("this worker is not configured to accept this tier of task")]
    WrongTier,

    #[error("task exceeded its budget before a result was produced")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorHint for WorkerError {
    fn user_hint(&self) -> String {
        match self {
            WorkerError::InvalidTask(msg) => format!("invalid task: {msg}"),
            WorkerError::WrongTier => "this worker does not serve that tier of task".into(),
            WorkerError::Timeout => "the task timed out before completing".into(),
            WorkerError::Internal(_) => "an internal error occurred".into(),
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, WorkerError::Timeout)
    }
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkerError::InvalidTask(_) => StatusCode::BAD_REQUEST,
            WorkerError::WrongTier => StatusCode::BAD_REQUEST,
            WorkerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            WorkerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.user_hint() }))).into_response()
    }
}
