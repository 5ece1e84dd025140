//! Router binary: classifies each task light/heavy and forwards to the
//! matching worker tier over HTTP.

mod classify;
mod config;
mod error;
mod routes;

use clap::Parser;
use tokio::net::TcpListener;

use config::Config;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    forge_core::telemetry::init("info", "router");
    let config = Config::parse();
    forge_core::telemetry::init(&config.log_level, "router");

    tracing::info!(
        port = config.router_port,
        light = %config.light_worker_url,
        heavy = %config.heavy_worker_url,
        "starting router"
    );

    let state = AppState::new(config.light_worker_url.clone(), config.heavy_worker_url.clone())?;
    let app = routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.router_port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "router listening");

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
