use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_core::ErrorHint;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("request body was not a valid Task: {0}")]
    InvalidTask(String),

    #[error("could not reach the {tier} worker: {message}")]
    UpstreamUnreachable { tier: &'static str, message: String },

    #[error("{tier} worker returned status {status}")]
    UpstreamStatus { tier: &'static str, status: u16, body: String },
}

impl ErrorHint for RouterError {
    fn user_hint(&self) -> String {
        match self {
            RouterError::InvalidTask(msg) => format!("invalid task: {msg}"),
            RouterError::UpstreamUnreachable { tier, .. } => format!("the {tier} worker is unreachable"),
            RouterError::UpstreamStatus { tier, status, .. } => {
                format!("the {tier} worker responded with status {status}")
            }
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RouterError::UpstreamUnreachable { .. } | RouterError::UpstreamStatus { .. }
        )
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        match self {
            RouterError::InvalidTask(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": format!("invalid task: {msg}") }))).into_response()
            }
            RouterError::UpstreamUnreachable { tier, message } => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": format!("{tier} worker unreachable: {message}") })),
            )
                .into_response(),
            RouterError::UpstreamStatus { status, body, .. } => {
                // Surface the downstream body and status verbatim, per the
                // router's "thin forwarder" contract.
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                (status, body).into_response()
            }
        }
    }
}
