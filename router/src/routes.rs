use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use forge_core::Task;

use crate::classify::{classify, Tier};
use crate::error::RouterError;

const LIGHT_TIMEOUT: Duration = Duration::from_secs(30);
const HEAVY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub light_client: reqwest::Client,
    pub heavy_client: reqwest::Client,
    pub light_url: String,
    pub heavy_url: String,
}

impl AppState {
    pub fn new(light_url: String, heavy_url: String) -> anyhow::Result<Self> {
        Ok(AppState {
            light_client: reqwest::Client::builder().timeout(LIGHT_TIMEOUT).build()?,
            heavy_client: reqwest::Client::builder().timeout(HEAVY_TIMEOUT).build()?,
            light_url,
            heavy_url,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/solve", post(solve_handler)).with_state(state)
}

async fn solve_handler(State(state): State<AppState>, Json(task): Json<Task>) -> Result<Response, RouterError> {
    let tier = classify(&task);
    let (client, base_url, tier_name) = match tier {
        Tier::Light => (&state.light_client, &state.light_url, "light"),
        Tier::Heavy => (&state.heavy_client, &state.heavy_url, "heavy"),
    };

    tracing::debug!(task = %task.id, domain = %task.domain, tier = tier.as_str(), "routing task");

    let url = format!("{}/solve", base_url.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .json(&task)
        .send()
        .await
        .map_err(|e| RouterError::UpstreamUnreachable {
            tier: tier_name,
            message: e.to_string(),
        })?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if status.as_u16() >= 300 {
        return Err(RouterError::UpstreamStatus {
            tier: tier_name,
            status: status.as_u16(),
            body,
        });
    }

    Ok((
        StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK),
        [("content-type", "application/json")],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unreachable_worker_surfaces_bad_gateway() {
        let state = AppState::new(
            "http://127.0.0.1:1".to_string(),
            "http://127.0.0.1:1".to_string(),
        )
        .unwrap();
        let app = router(state);
        let task = Task::new("text", serde_json::json!({"text": "hi"}));
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/solve")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&task).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }
}
