//! `gateway-server`: HTTP front door for the LLM gateway resilience core.
//! Exposes `/v1/chat` (+ `?stream=1` SSE), `/v1/complete`, `/v1/embed`,
//! `/v1/models`, `/v1/costs`, following the same axum `Router`/`State` +
//! graceful-shutdown idiom as `worker`/`router`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use forge_core::CancelScope;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use gateway::cost::{CostFilter, GroupBy};
use gateway::provider::{ChatRequest, CompleteRequest, EmbedRequest};
use gateway::{CostAggregator, ErrorHint, Gateway, GatewayConfig, GatewayError, MemoryCostAggregator, ModelRegistry, ProviderBackend};
use gateway::cost_relational::SqliteCostAggregator;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ProviderArg {
    Mock,
    Http,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CostBackendArg {
    Memory,
    Sqlite,
}

#[derive(Debug, Parser)]
#[command(name = "gateway-server", about = "HTTP front door for the LLM gateway resilience core")]
struct Config {
    #[arg(long, env = "GATEWAY_PORT", default_value_t = 8082)]
    gateway_port: u16,

    /// Model registry YAML path. Falls back to a single mock model when unset.
    #[arg(long, env = "CONFIG")]
    config_path: Option<String>,

    #[arg(long, env = "PROVIDER", value_enum, default_value = "mock")]
    provider: ProviderArg,

    #[arg(long, env = "COST_BACKEND", value_enum, default_value = "memory")]
    cost_backend: CostBackendArg,

    #[arg(long, env = "COST_DB_PATH", default_value = "./cost.db")]
    cost_db_path: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    forge_core::telemetry::init("info", "gateway");
    let config = Config::parse();
    forge_core::telemetry::init(&config.log_level, "gateway");

    let registry = match &config.config_path {
        Some(path) => ModelRegistry::load_path(path).await?,
        None => ModelRegistry::mock(),
    };

    let backend = match config.provider {
        ProviderArg::Mock => ProviderBackend::Mock,
        ProviderArg::Http => ProviderBackend::Http(reqwest::Client::builder().build()?),
    };

    let cost: Arc<dyn CostAggregator> = match config.cost_backend {
        CostBackendArg::Memory => Arc::new(MemoryCostAggregator::new()),
        CostBackendArg::Sqlite => Arc::new(SqliteCostAggregator::open(&config.cost_db_path).await?),
    };

    let gateway = Arc::new(Gateway::new(registry, backend, cost, GatewayConfig::default()));
    let state = AppState { gateway };

    let app = Router::new()
        .route("/v1/chat", post(chat_handler))
        .route("/v1/complete", post(complete_handler))
        .route("/v1/embed", post(embed_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/costs", get(costs_handler))
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", config.gateway_port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "gateway-server listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.await.ok();
        })
        .await?;

    Ok(())
}

/// Parsed `X-Caller` / `X-Budget-Amount` request headers.
struct CallHeaders {
    caller: String,
    budget: Option<(f64, String)>,
}

fn parse_headers(headers: &HeaderMap) -> CallHeaders {
    let caller = headers
        .get("x-caller")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let budget = headers
        .get("x-budget-amount")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_budget_header);

    CallHeaders { caller, budget }
}

/// Grammar: `amount ";" "currency=" ISO4217`.
fn parse_budget_header(raw: &str) -> Option<(f64, String)> {
    let (amount_part, currency_part) = raw.split_once(';')?;
    let amount: f64 = amount_part.trim().parse().ok()?;
    let currency = currency_part.trim().strip_prefix("currency=")?.to_string();
    Some((amount, currency))
}

async fn check_budget(gateway: &Gateway, caller: &str, budget: &Option<(f64, String)>) -> Result<(), GatewayError> {
    let Some((amount, currency)) = budget else {
        return Ok(());
    };
    let info = gateway.cost.budget_info(caller, *amount, currency).await;
    if info.exceeded {
        return Err(GatewayError::BudgetExceeded {
            caller: caller.to_string(),
            amount: *amount,
            currency: currency.clone(),
        });
    }
    Ok(())
}

fn gateway_error_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::UnknownModel(_) | GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::BudgetExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
        GatewayError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::RateLimitCancelled | GatewayError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::ProviderFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: GatewayError) -> Response {
    let status = gateway_error_status(&err);
    (status, Json(json!({ "error": err.user_hint() }))).into_response()
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<StreamQuery>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let call_headers = parse_headers(&headers);
    if let Err(e) = check_budget(&state.gateway, &call_headers.caller, &call_headers.budget).await {
        return error_response(e);
    }

    if q.is_streaming() {
        let scope = CancelScope::with_timeout(REQUEST_TIMEOUT);
        let events = state.gateway.chat_stream(req, &call_headers.caller, &scope).await;
        let body = events.iter().map(|e| e.to_sse()).collect::<String>();
        return (
            StatusCode::OK,
            [("content-type", "text/event-stream"), ("cache-control", "no-cache")],
            body,
        )
            .into_response();
    }

    let scope = CancelScope::with_timeout(REQUEST_TIMEOUT);
    match state.gateway.chat(req, &call_headers.caller, &scope).await {
        Ok(outcome) => {
            let mut resp = Json(outcome.response.clone()).into_response();
            resp.headers_mut().insert(
                "x-cost-total",
                format!("{};currency={}", outcome.cost_total, outcome.currency).parse().unwrap(),
            );
            resp
        }
        Err(e) => error_response(e),
    }
}

async fn complete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompleteRequest>,
) -> Response {
    let call_headers = parse_headers(&headers);
    if let Err(e) = check_budget(&state.gateway, &call_headers.caller, &call_headers.budget).await {
        return error_response(e);
    }
    let scope = CancelScope::with_timeout(REQUEST_TIMEOUT);
    match state.gateway.complete(req, &call_headers.caller, &scope).await {
        Ok(outcome) => {
            let mut resp = Json(outcome.response.clone()).into_response();
            resp.headers_mut().insert(
                "x-cost-total",
                format!("{};currency={}", outcome.cost_total, outcome.currency).parse().unwrap(),
            );
            resp
        }
        Err(e) => error_response(e),
    }
}

async fn embed_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EmbedRequest>,
) -> Response {
    let call_headers = parse_headers(&headers);
    if let Err(e) = check_budget(&state.gateway, &call_headers.caller, &call_headers.budget).await {
        return error_response(e);
    }
    let scope = CancelScope::with_timeout(REQUEST_TIMEOUT);
    match state.gateway.embed(req, &call_headers.caller, &scope).await {
        Ok(outcome) => {
            let mut resp = Json(outcome.response.clone()).into_response();
            resp.headers_mut().insert(
                "x-cost-total",
                format!("{};currency={}", outcome.cost_total, outcome.currency).parse().unwrap(),
            );
            resp
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    stream: Option<String>,
}

impl StreamQuery {
    fn is_streaming(&self) -> bool {
        matches!(self.stream.as_deref(), Some("1") | Some("true"))
    }
}

async fn models_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let models = state.gateway.registry().list();
    Json(json!({ "models": models }))
}

#[derive(Debug, Deserialize)]
struct CostsQuery {
    from: Option<chrono::DateTime<chrono::Utc>>,
    to: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "groupBy")]
    group_by: Option<String>,
}

async fn costs_handler(State(state): State<AppState>, Query(q): Query<CostsQuery>) -> Response {
    let filter = CostFilter {
        caller: None,
        provider: None,
        model: None,
        from: q.from,
        to: q.to,
    };

    let group_by = match q.group_by.as_deref() {
        Some("provider") => Some(GroupBy::Provider),
        Some("model") => Some(GroupBy::Model),
        Some("caller") => Some(GroupBy::Caller),
        Some("currency") => Some(GroupBy::Currency),
        Some(other) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown groupBy '{other}'") })),
            )
                .into_response()
        }
        None => None,
    };

    match group_by {
        Some(g) => Json(state.gateway.cost.report(&filter, g).await).into_response(),
        None => Json(state.gateway.cost.summary(&filter).await).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_budget_header_grammar() {
        let (amount, currency) = parse_budget_header("12.5;currency=USD").unwrap();
        assert_eq!(amount, 12.5);
        assert_eq!(currency, "USD");
    }

    #[test]
    fn rejects_malformed_budget_header() {
        assert!(parse_budget_header("not-a-number;currency=USD").is_none());
        assert!(parse_budget_header("12.5").is_none());
    }

    #[test]
    fn stream_query_recognizes_1_and_true() {
        assert!(StreamQuery { stream: Some("1".to_string()) }.is_streaming());
        assert!(StreamQuery { stream: Some("true".to_string()) }.is_streaming());
        assert!(!StreamQuery { stream: None }.is_streaming());
        assert!(!StreamQuery { stream: Some("0".to_string()) }.is_streaming());
    }

    #[tokio::test]
    async fn chat_handler_sets_cost_header_on_success() {
        let gateway = Arc::new(Gateway::mock(Arc::new(MemoryCostAggregator::new())));
        let state = AppState { gateway };
        let req = ChatRequest {
            model: "mock:gpt-mini".to_string(),
            messages: vec![gateway::provider::Message {
                role: gateway::provider::MessageRole::User,
                content: "hello".to_string(),
            }],
            tools: vec![],
            temperature: None,
            top_p: None,
            max_tokens: None,
        };
        let resp = chat_handler(
            State(state),
            HeaderMap::new(),
            Query(StreamQuery { stream: None }),
            Json(req),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-cost-total"));
    }
}
