//! Clopus Dashboard - Web view of watcher runs, fixes and the live log

use anyhow::{Context, Result};
use clap::Parser;
use clopus_common::{LogTail, Store};
use clopus_dashboard::config::{ConfigOverrides, DashboardConfig};
use clopus_dashboard::server::{self, AppState};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "clopus-dashboard", version, about = "Read-only dashboard for watcher runs")]
struct Cli {
    /// TOML config file (also DASHBOARD_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Watcher SQLite database (overrides SQLITE_PATH)
    #[arg(long)]
    sqlite_path: Option<PathBuf>,

    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Watcher log file (overrides LOG_PATH)
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Listen address (overrides BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        sqlite_path: cli.sqlite_path,
        port: cli.port,
        log_path: cli.log_path,
        bind_address: cli.bind,
    };
    let config = DashboardConfig::load(cli.config.as_deref(), &overrides)?;

    info!("Clopus Dashboard v{} starting", env!("CARGO_PKG_VERSION"));

    let store = Store::open(&config.sqlite_path).with_context(|| {
        format!("Failed to open database {}", config.sqlite_path.display())
    })?;
    let log_tail = LogTail::new(&config.log_path);
    info!("Tailing watcher log at {}", config.log_path.display());

    server::run(AppState::new(store, log_tail), &config.listen_addr()).await
}
