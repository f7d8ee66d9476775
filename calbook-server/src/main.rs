mod routes;
mod state;

use anyhow::{Context, Result};
use axum::Router;
use calbook_core::config::{LogFormat, ServiceConfig};
use calbook_core::storage::SqliteStorage;
use clap::Parser;
use std::path::PathBuf;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "calbook-server")]
#[command(about = "HTTP API for calbook events", version)]
struct Cli {
    /// Path to config.toml (defaults to ~/.config/calbook/config.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref())?;
    init_tracing(&config);

    let database_path = config.storage.database_path();
    let storage = SqliteStorage::open(&database_path)
        .with_context(|| format!("Failed to open {}", database_path.display()))?;
    let state = AppState::new(storage);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::events::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    info!("calbook-server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if shutdown_signal().await.is_ok() {
                info!("shutting down");
            }
        })
        .await?;

    Ok(())
}

/// Resolves on ctrl-c, or on SIGTERM where the platform has it.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    let mut terminate = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let terminated = terminate.recv();
    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => interrupted,
        _ = terminated => Ok(()),
    }
}

fn init_tracing(config: &ServiceConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json().with_ansi(false)).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}
