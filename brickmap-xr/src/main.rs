//! brickmap-xr - cross-catalog resolution and inventory service
//!
//! Serves materialized container inventories and runs the minifigure
//! matching pass on demand.

use anyhow::{Context, Result};
use brickmap_common::config::{self as common_config, RootFolderInitializer, RootFolderResolver};
use brickmap_xr::catalog::HttpCatalogClient;
use brickmap_xr::config::{EngineConfig, ENGINE_CONFIG_FILE};
use brickmap_xr::AppState;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 5790;

/// Command-line arguments for brickmap-xr
#[derive(Parser, Debug)]
#[command(name = "brickmap-xr")]
#[command(about = "Cross-catalog entity resolution and inventory service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "BRICKMAP_XR_PORT")]
    port: Option<u16>,

    /// Root folder holding the database and engine config
    #[arg(short, long, env = "BRICKMAP_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Engine config file (defaults to brickmap-xr.toml in the root folder)
    #[arg(short, long, env = "BRICKMAP_XR_CONFIG")]
    config: Option<PathBuf>,

    /// Run one matching pass before serving
    #[arg(long)]
    match_on_start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let bootstrap = match common_config::config_file_path() {
        Some(path) => match common_config::load_toml_config(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("Ignoring bootstrap config {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };
    let default_level = bootstrap
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());

    let log_file = match bootstrap.as_ref().and_then(|c| c.logging.file.clone()) {
        Some(path) => match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(Arc::new(file)),
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("brickmap_xr={0},brickmap_common={0}", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(log_file.map(|file| tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file)))
        .init();

    info!(
        "Starting brickmap-xr {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut resolver = RootFolderResolver::new("brickmap-xr").with_cli_arg(args.root_folder.clone());
    if let Some(config) = bootstrap.clone() {
        resolver = resolver.with_toml_config(config);
    }
    let initializer = RootFolderInitializer::new(resolver.resolve());
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| initializer.root_folder().join(ENGINE_CONFIG_FILE));
    let engine_config = EngineConfig::load(&config_path).context("Failed to load engine config")?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = brickmap_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let client = HttpCatalogClient::new(&engine_config.catalogs)
        .map_err(|e| anyhow::anyhow!("Failed to build catalog client: {}", e))?;
    let state = AppState::new(pool, Arc::new(client), &engine_config);

    if args.match_on_start {
        let _guard = state.matching_lock.lock().await;
        match state.matching.run_matching_pass().await {
            Ok(report) => info!(new_matches = report.new_matches(), "Startup matching pass complete"),
            Err(e) => warn!("Startup matching pass failed: {}", e),
        }
    }

    let port = args
        .port
        .or_else(|| bootstrap.as_ref().and_then(|c| c.port))
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let app = brickmap_xr::build_router(state);

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
