//! Worker binary: a light (KB-only) or heavy (full solver) tier of the
//! two-tier solving engine, exposed over HTTP.

mod config;
mod error;
mod routes;
mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gateway::{Gateway, GatewayConfig, MemoryCostAggregator, ModelRegistry, ProviderBackend};
use kb::Kb;
use solver::{LlmMode, Solver};
use tokio::net::TcpListener;

use config::{Config, LlmModeArg, WorkerType};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    forge_core::telemetry::init("info", "worker");
    let config = Config::parse();
    forge_core::telemetry::init(&config.log_level, "worker");

    tracing::info!(worker_type = config.worker_type.as_str(), port = config.worker_port, "starting worker");

    let kb = Arc::new(Kb::open(config.kb_root()).await?);

    let solver = match config.worker_type {
        WorkerType::Light => None,
        WorkerType::Heavy => Some(Arc::new(build_solver(&config, kb.clone()).await?)),
    };

    let state = AppState {
        worker_type: config.worker_type,
        kb,
        solver,
        task_timeout: Duration::from_millis(config.task_timeout_millis),
    };

    let app = routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.worker_port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "worker listening");

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

/// Builds the heavy tier's `Gateway` + `Solver`. The model registry and
/// provider backend are only consulted when `LLM_MODE=real`; mock mode
/// never touches `CONFIG` or `POLICY_ALLOW_TOOLS`.
async fn build_solver(config: &Config, kb: Arc<Kb>) -> anyhow::Result<Solver> {
    let cost = Arc::new(MemoryCostAggregator::new());

    let (registry, backend, llm_mode) = match config.llm_mode {
        LlmModeArg::Mock => (ModelRegistry::mock(), ProviderBackend::Mock, LlmMode::Mock),
        LlmModeArg::Real => {
            let registry = match &config.config_path {
                Some(path) => ModelRegistry::load_path(path).await?,
                None => ModelRegistry::mock(),
            };
            enforce_host_allowlist(config, &registry)?;
            let client = reqwest::Client::builder().build()?;
            (
                registry,
                ProviderBackend::Http(client),
                LlmMode::Real {
                    model: config.default_model.clone(),
                },
            )
        }
    };

    let gateway = Arc::new(Gateway::new(registry, backend, cost, GatewayConfig::default()));
    Ok(Solver::new(kb, gateway, "worker", llm_mode))
}

/// Policy check: every registered model's base URL host must be on the
/// allowlist when one is configured. Runs once at startup rather than per
/// call -- the registry is immutable for the life of the process.
fn enforce_host_allowlist(config: &Config, registry: &ModelRegistry) -> anyhow::Result<()> {
    let allowed = config.allowed_hosts();
    if allowed.is_empty() {
        return Ok(());
    }
    for model in registry.list() {
        let host = url_host(&model.base_url);
        if !allowed.iter().any(|h| h == &host) {
            anyhow::bail!("model '{}' base url host '{}' is not on POLICY_ALLOW_TOOLS", model.id, host);
        }
    }
    Ok(())
}

fn url_host(url: &str) -> String {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let host_port = without_scheme.split('/').next().unwrap_or(without_scheme);
    host_port.split(':').next().unwrap_or(host_port).to_string()
}
