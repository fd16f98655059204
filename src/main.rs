//! Drover
//!
//! Supervises a sing-box engine from the desktop.
//!
//! # Architecture Overview
//!
//! ```text
//!   drover.toml ──▶ options ──┐
//!                             ▼
//!   config.json ──▶ extract ──▶ Supervisor ──spawn──▶ sing-box run -c config.json
//!                               │     │
//!                               │     └── SelectorSynchronizer ──HTTP──▶ Clash API
//!                               │            (PUT /proxies/{tag}, DELETE /connections)
//!                               │
//!                               └── SystemProxy (OS proxy settings)
//!
//!   Main loop: signals, config watcher, engine monitor
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use drover::config::loader::{load_options, OPTIONS_FILE_NAME};
use drover::config::options::default_engine_dir;
use drover::config::watcher::{next_change, ConfigWatcher};
use drover::engine::EngineState;
use drover::lifecycle::{Shutdown, Signal, SignalListener};
use drover::observability::{logging::init_logging, metrics::init_metrics};
use drover::system_proxy::platform_backend;
use drover::Supervisor;

const MONITOR_INTERVAL: Duration = Duration::from_secs(5);
const WATCH_QUIET: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "drover")]
#[command(about = "Supervisor for a sing-box proxy engine", long_about = None)]
struct Cli {
    /// Options file (defaults to drover.toml next to the executable)
    #[arg(short, long)]
    options: Option<PathBuf>,

    /// Engine configuration file, overriding the options file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the sing-box executable, overriding the options file
    #[arg(long)]
    engine_dir: Option<PathBuf>,

    /// Log level, overriding the options file
    #[arg(long)]
    log_level: Option<String>,

    /// Leave the system proxy alone
    #[arg(long)]
    no_system_proxy: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let options_path = cli
        .options
        .clone()
        .unwrap_or_else(|| default_engine_dir().join(OPTIONS_FILE_NAME));
    let mut options = match load_options(&options_path) {
        Ok(options) => options,
        Err(e) => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            tracing::error!(error = %e, "Failed to load options");
            return ExitCode::FAILURE;
        }
    };

    if let Some(config) = cli.config {
        options.config_path = config;
    }
    if let Some(dir) = cli.engine_dir {
        options.engine_dir = dir;
    }
    if let Some(level) = cli.log_level {
        options.log_level = level;
    }
    if cli.no_system_proxy {
        options.system_proxy_auto = false;
    }

    init_logging(&options.log_level);
    tracing::info!("drover v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(address) = &options.metrics_address {
        match address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %address, error = %e, "Failed to parse metrics address"),
        }
    }

    let mut signals = match SignalListener::new() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let watch_config = options.watch_config;
    let supervisor = match Supervisor::initialize(options, platform_backend()).await {
        Ok(supervisor) => Arc::new(supervisor),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    if let Some(warning) = supervisor.start_warning() {
        tracing::warn!(warning = %warning, "Engine is not running");
    }
    tracing::debug!(menu = ?supervisor.menu(), "Menu built");

    let shutdown = Shutdown::new();
    let monitor = tokio::spawn(monitor_engine(supervisor.clone(), shutdown.clone()));

    let (watcher, mut changes) = ConfigWatcher::new(&supervisor.options().config_path);
    let watcher_handle = if watch_config {
        match watcher.run() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable");
                None
            }
        }
    } else {
        None
    };
    let mut watching = watcher_handle.is_some();

    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                Signal::Shutdown => break,
                Signal::Reload => restart(&supervisor).await,
            },
            changed = next_change(&mut changes, WATCH_QUIET), if watching => {
                if changed {
                    restart(&supervisor).await;
                } else {
                    watching = false;
                }
            }
        }
    }

    shutdown.trigger();
    let _ = monitor.await;
    let outcome = supervisor.shutdown().await;

    tracing::info!(outcome = ?outcome, "Shutdown complete");
    ExitCode::SUCCESS
}

async fn restart(supervisor: &Supervisor) {
    if let Err(e) = supervisor.restart().await {
        tracing::error!(error = %e, "Restart rejected, keeping the running engine");
    } else if let Some(warning) = supervisor.start_warning() {
        tracing::warn!(warning = %warning, "Engine is not running after restart");
    }
}

/// Reap the engine if it dies on its own.
async fn monitor_engine(supervisor: Arc<Supervisor>, shutdown: Shutdown) {
    let mut rx = shutdown.subscribe();
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    let mut last = supervisor.engine_state();

    loop {
        tokio::select! {
            _ = rx.recv() => break,
            _ = ticker.tick() => {
                let state = supervisor.refresh_engine().await;
                if state != last && state == EngineState::Exited {
                    tracing::warn!("Engine is no longer running");
                }
                last = state;
            }
        }
    }
}
