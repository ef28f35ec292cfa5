//! AVB Datastore server
//!
//! Serves an emulated AVB audio interface datastore over HTTP.

use anyhow::{Context, Result};
use avb_datastore::api::{self, ApiState};
use avb_datastore::config::{AppConfig, ConfigWatcher, LoggingConfig};
use avb_datastore::datastore::{HierarchicalStore, PollCoordinator};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Emulated AVB audio interface datastore
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON file with the initial datastore state (overrides config)
    #[arg(short, long)]
    datastore: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(&args).await?;

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = init_logging(&config.logging)?;

    info!("Starting AVB datastore...");
    info!("Configuration file: {}", args.config.display());

    let store = match &config.datastore.seed {
        Some(seed) => HierarchicalStore::load(seed).await?,
        None => {
            info!("No datastore seed configured, starting empty");
            HierarchicalStore::new()
        }
    };
    let store = Arc::new(store);

    let poller = Arc::new(PollCoordinator::with_max_wait(
        store,
        config.datastore.wait_budget(),
    ));
    info!("Long-poll wait budget: {:?}", poller.max_wait());

    spawn_config_reload(&args.config, config.clone(), poller.clone());

    let state = Arc::new(ApiState::new(poller));
    api::start_server(state, config.server.socket_addr(), shutdown_signal()).await?;

    info!("AVB datastore shutdown complete");
    Ok(())
}

/// Load the config file (or defaults) and apply command line overrides
async fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(&args.config).await?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(datastore) = &args.datastore {
        config.datastore.seed = Some(datastore.clone());
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Watch the config file and apply wait budget changes to the running poller
fn spawn_config_reload(path: &Path, current: AppConfig, poller: Arc<PollCoordinator>) {
    if !path.exists() {
        return;
    }

    let mut watcher = match ConfigWatcher::new(path, current) {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!("Config hot-reload disabled: {:#}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while let Some(change) = watcher.next_change().await {
            if change.wait_budget_changed {
                poller.set_max_wait(change.config.datastore.wait_budget());
                info!("Long-poll wait budget changed to {:?}", poller.max_wait());
            }
            if change.restart_required {
                warn!("Server, seed and logging changes take effect after restart");
            }
        }
    });
}

fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
