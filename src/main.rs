//! Service sentinel daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌────────────┐   probe    ┌─────────────┐  changes  ┌───────────┐
//!   │  services  │◀───────────│ HealthProbe │──────────▶│ StatusBus │──▶ SSE / UI
//!   └────────────┘            └──────▲──────┘           └─────┬─────┘
//!                                    │ per-service loop       │
//!                             ┌──────┴────────┐        ┌──────▼──────────┐
//!                             │ StatusMonitor │◀──────▶│ WebSocketChannel│◀─▶ relay
//!                             └───────────────┘ remote └─────────────────┘
//!
//!   request ──▶ FallbackRouter ──▶ provider[0] ──▶ provider[1] ──▶ ...
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use service_sentinel::admin::{setup_admin_router, AppState};
use service_sentinel::config::watcher::ConfigWatcher;
use service_sentinel::config::{load_config, SentinelConfig};
use service_sentinel::lifecycle::{signals, Sentinel, Shutdown};
use service_sentinel::observability::{logging, metrics};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "service-sentinel")]
#[command(about = "Adaptive health monitoring and provider fallback daemon", long_about = None)]
struct Args {
    /// Configuration file (TOML). Defaults are used if it does not exist.
    #[arg(short, long, env = "SENTINEL_CONFIG", default_value = "sentinel.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_exists = args.config.exists();
    let config = if config_exists {
        load_config(&args.config)?
    } else {
        SentinelConfig::default()
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-sentinel starting");

    if !config_exists {
        tracing::warn!(path = %args.config.display(), "Config file not found, using defaults");
    }
    tracing::info!(
        services = config.services.len(),
        providers = config.providers.len(),
        interval_ms = config.monitor.interval_ms,
        broadcast = config.broadcast.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let signal_task = signals::spawn_signal_handler(shutdown.clone());

    let sentinel = Arc::new(Sentinel::build(config.clone(), &shutdown)?);
    sentinel.start().await;

    // Keep the watcher alive for the lifetime of the process
    let _watcher = if config_exists {
        match ConfigWatcher::new(&args.config).spawn(shutdown.token()) {
            Ok((watcher, updates, reload_task)) => {
                sentinel.track(reload_task);
                sentinel.track(tokio::spawn(apply_reloads(sentinel.clone(), updates, shutdown.token())));
                Some(watcher)
            }
            Err(e) => {
                tracing::error!(error = %e, "Config watcher unavailable, hot reload disabled");
                None
            }
        }
    } else {
        None
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let app = setup_admin_router(AppState::from_sentinel(&sentinel));
        let graceful = shutdown.wait();
        sentinel.track(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(graceful).await {
                tracing::error!(error = %e, "Admin API server failed");
            }
        }));
    }

    shutdown.wait().await;
    sentinel.stop(SHUTDOWN_DEADLINE).await;
    let _ = signal_task.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn apply_reloads(
    sentinel: Arc<Sentinel>,
    mut updates: mpsc::Receiver<SentinelConfig>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            update = updates.recv() => match update {
                Some(new_config) => {
                    if let Err(e) = sentinel.apply_config(new_config).await {
                        tracing::error!(error = %e, "Failed to apply reloaded config");
                    }
                }
                None => break,
            },
        }
    }
}
