use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tiergate::config::{LoggingConfig, StoreConfig, TiergateConfig};
use tiergate::http::{router, AppState, HttpServer};
use tiergate::ratelimit::{RateLimitGate, SystemClock};
use tiergate::store::{RedisWindowStore, WindowStore};

/// Tiered per-client rate limiting gate.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML or TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TiergateConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }
    if args.log_json {
        config.logging.json = true;
    }

    // The subscriber depends on the loaded config, so the file path is
    // logged here rather than while loading.
    init_tracing(&config.logging);

    info!("Starting Tiergate rate limiting gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => info!(path = %path.display(), "Configuration file loaded"),
        None => info!("No configuration file, using defaults and environment"),
    }

    config.validate()?;
    info!(
        http_addr = %config.server.http_addr,
        plans = config.tiers.plans.len(),
        default_plan = %config.tiers.default_plan,
        "Configuration loaded"
    );

    let store = connect_store(&config.store).await;
    let gate = Arc::new(RateLimitGate::from_config(&config, store)?);
    info!(enforcing = gate.has_store(), "Rate limit gate initialized");

    let app = router(AppState::new(gate, Arc::new(SystemClock)));
    let server = HttpServer::bind(config.server.http_addr, app).await?;

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Tiergate stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

/// Connect to the counting store, or `None` to run fail-open.
async fn connect_store(config: &StoreConfig) -> Option<Arc<dyn WindowStore>> {
    if !config.enabled {
        warn!("Store disabled by configuration, requests will not be rate limited");
        return None;
    }

    match RedisWindowStore::connect(config).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(
                error = %e,
                host = %config.host,
                port = config.port,
                "Could not connect to store, requests will not be rate limited"
            );
            None
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
