mod notifier;

use anyhow::Result;
use calbook_broker::{AmqpConnector, BackoffPolicy, Consumer, Topology};
use calbook_core::Event;
use calbook_core::config::{LogFormat, ServiceConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::notifier::LogNotifier;

#[derive(Parser)]
#[command(name = "calbook-sender")]
#[command(about = "Deliver calbook reminder notifications", version)]
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

    let broker = &config.broker;
    let backoff = &config.backoff;
    let consumer = Arc::new(
        Consumer::new(
            AmqpConnector::new(&broker.uri),
            Topology::new(&broker.exchange, &broker.queue, &broker.routing_key),
            BackoffPolicy {
                initial: backoff.initial,
                multiplier: backoff.multiplier,
                max_interval: backoff.max_interval,
                max_elapsed: backoff.max_elapsed,
            },
        )
        .with_prefetch(broker.prefetch)
        .with_consumer_tag(&broker.consumer_tag),
    );

    let notifier = LogNotifier::default();
    let workers = broker.workers;
    let mut running = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        let notifier = notifier.clone();
        async move { consumer.consume::<Event, _>(workers, notifier).await }
    });
    info!(queue = %broker.queue, workers, "sender started");

    let outcome = tokio::select! {
        finished = &mut running => finished?,
        received = shutdown_signal() => {
            received?;
            info!("shutting down, waiting for in-flight notifications");
            consumer.stop();
            running.await?
        }
    };

    info!(delivered = notifier.delivered(), "sender stopped");
    if let Err(e) = outcome {
        error!(error = %e, "sender giving up");
        return Err(e.into());
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
