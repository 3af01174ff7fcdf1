//! # Meridian Server
//!
//! Starts the sync engine and serves its HTTP API.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. tracing subscriber (RUST_LOG, default info)                         │
//! │  2. EngineConfig: defaults → meridian.toml → MERIDIAN_* env             │
//! │  3. SQLite pool + migrations                                            │
//! │  4. HttpRecordClient → SyncCoordinator                                  │
//! │  5. HttpPosClient → PosIngestion (only with a POS token)                │
//! │  6. Scheduler task                                                      │
//! │  7. axum on server.bind_addr until Ctrl-C / SIGTERM, then stop          │
//! │     the scheduler and close the pool                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `meridian [--config <path>]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meridian_db::{Database, DbConfig};
use meridian_server::{build_router, AppState};
use meridian_sync::{
    EngineConfig, HttpPosClient, HttpRecordClient, PaginatedIngestor, PosIngestion, Scheduler,
    SyncCoordinator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Meridian sync server...");

    let config = EngineConfig::load(config_path_from_args()).context("loading configuration")?;
    info!(
        bind_addr = %config.server.bind_addr,
        database = %config.database.path.display(),
        remote = %config.remote.base_url,
        "Configuration loaded"
    );

    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let db = Database::new(
        DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
    )
    .await
    .context("opening database")?;

    if !config.remote_configured() {
        warn!("Remote API key or base id missing; table syncs will fail until configured");
    }
    let client = HttpRecordClient::new(&config.remote)?;
    let coordinator = SyncCoordinator::new(db.clone(), Arc::new(client), &config.remote.base_id)
        .with_settings(&config.sync);

    let pos = if config.pos_configured() {
        let ingestor = PaginatedIngestor::new(config.pos.page_size)
            .page_timeout(config.pos.page_timeout())
            .deadline(config.sync.run_deadline());
        Some(PosIngestion::from_client(db.clone(), HttpPosClient::new(&config.pos)?).ingestor(ingestor))
    } else {
        info!("No POS token configured; POS jobs disabled");
        None
    };

    let scheduler = Scheduler::new(db.clone(), coordinator.clone(), pos.clone()).start();

    let mut state = AppState::new(db.clone(), coordinator).with_scheduler(scheduler.clone());
    if let Some(pos) = pos {
        state = state.with_pos(pos);
    }

    let listener = TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "HTTP server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    scheduler.stop().await;
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// `--config <path>` or `--config=<path>`.
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
