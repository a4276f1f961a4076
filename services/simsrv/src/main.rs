//! simsrv entry point
//!
//! Loads the service configuration, restores stored devices, starts the
//! enabled ones and serves the admin API until a shutdown signal arrives.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use simsrv::config::Config;
use simsrv::core::manager::DeviceManager;
use simsrv::storage::JsonFileStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "simsrv - Modbus slave device simulator")]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the device data directory
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate configuration and stored devices, then exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    config.validate()?;

    common::logging::init(&config.log.level)
        .map_err(|e| anyhow::anyhow!("logging init failed: {e}"))?;

    match args.command {
        Some(Commands::Check) => check(config).await,
        None => run_service(config).await,
    }
}

/// Validate the service configuration and every stored device file
async fn check(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(JsonFileStore::new(&config.data_dir)?);
    let manager = DeviceManager::new(store);
    manager.load_all().await?;
    info!("configuration OK");
    Ok(())
}

async fn run_service(config: Config) -> anyhow::Result<()> {
    info!("starting simsrv v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(JsonFileStore::new(&config.data_dir)?);
    let manager = Arc::new(DeviceManager::new(store));
    manager.load_all().await?;

    let started = manager.start_enabled().await;
    info!("{started} device(s) started");

    let app = simsrv::api::router(manager.clone());
    let listener = tokio::net::TcpListener::bind(&config.api.listen).await?;
    info!("admin API listening on {}", listener.local_addr()?);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result?;
        },
        _ = common::shutdown::wait_for_shutdown() => {
            info!("shutdown signal received");
        },
    }

    manager.stop_all().await;
    info!("simsrv stopped");
    Ok(())
}
