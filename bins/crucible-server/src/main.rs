mod handlers;
mod middleware;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use crucible_common::config::Config;
use crucible_engine::Dispatcher;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("crucible server booting...");

    let config = Config::from_env();
    crucible_engine::prepare_sandbox_root(&config.sandbox_root)
        .await
        .context("failed to create sandbox root directory")?;

    let dispatcher = Arc::new(Dispatcher::with_docker(config.clone()));
    let state = AppState {
        dispatcher,
        config: Arc::new(config.clone()),
    };

    let app = routes::router(state, &config);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("HTTP server listening on {}", config.listen_addr);
    info!("ready to accept submissions");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("server exited cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install CTRL+C handler");
        return;
    }
    warn!("received shutdown signal, draining connections");
}
