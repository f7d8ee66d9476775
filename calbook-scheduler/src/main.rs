use anyhow::{Context, Result};
use calbook_broker::{AmqpConnector, BackoffPolicy, Producer, Topology};
use calbook_core::config::{LogFormat, ServiceConfig};
use calbook_core::storage::SqliteStorage;
use calbook_scheduler::Scheduler;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "calbook-scheduler")]
#[command(about = "Publish due event reminders to the notification exchange", version)]
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
    let storage = Arc::new(
        SqliteStorage::open(&database_path)
            .with_context(|| format!("Failed to open {}", database_path.display()))?,
    );

    let broker = &config.broker;
    let backoff = &config.backoff;
    let producer = Arc::new(Producer::new(
        AmqpConnector::new(&broker.uri),
        Topology::new(&broker.exchange, &broker.queue, &broker.routing_key),
        BackoffPolicy {
            initial: backoff.initial,
            multiplier: backoff.multiplier,
            max_interval: backoff.max_interval,
            max_elapsed: backoff.max_elapsed,
        },
    ));

    let scheduler = Arc::new(Scheduler::new(storage, producer, config.scheduler.interval));
    let mut running = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run().await }
    });

    tokio::select! {
        finished = &mut running => {
            finished?.context("Scheduler stopped")?;
        }
        received = shutdown_signal() => {
            received?;
            info!("shutting down");
            scheduler.stop().await?;
            running.await??;
        }
    }

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
