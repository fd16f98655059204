use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use drover::config::loader::load_engine_config;
use drover::config::options::default_engine_dir;
use drover::config::EngineConfig;
use drover::control::{ControlPlaneClient, SelectorSynchronizer};
use drover::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "drover-ctl")]
#[command(about = "Talk to a running sing-box engine's control plane", long_about = None)]
struct Cli {
    /// Engine configuration to read the controller and selectors from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Controller address (host:port), overriding the config
    #[arg(long)]
    controller: Option<String>,

    /// Bearer secret, overriding the config
    #[arg(long)]
    secret: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Point a selector at an outbound, then drop open connections
    Select { selector: String, outbound: String },
    /// Drop all open connections
    Purge,
    /// Show what the engine has selected
    Show { selector: Option<String> },
    /// Re-apply the defaults declared in the config
    Defaults,
    /// Check that the control plane answers
    Ping,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| default_engine_dir().join("config.json"));
    let mut config = match load_engine_config(&config_path) {
        Ok(config) => config,
        Err(e) if cli.controller.is_some() => {
            tracing::debug!(error = %e, "Continuing without engine config");
            EngineConfig::default()
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(controller) = cli.controller {
        config.control_address = controller;
    }
    if let Some(secret) = cli.secret {
        config.control_secret = secret;
    }

    let client = ControlPlaneClient::from_config(&config, Duration::from_secs(cli.timeout));
    if !client.is_enabled() {
        eprintln!("Error: no controller configured (experimental.clash_api.external_controller)");
        return ExitCode::FAILURE;
    }

    let ok = match cli.command {
        Commands::Select { selector, outbound } => {
            client.set_selector(&selector, &outbound).await && client.purge_connections().await
        }
        Commands::Purge => client.purge_connections().await,
        Commands::Show { selector: Some(name) } => show(&client, &name).await,
        Commands::Show { selector: None } => {
            if config.selectors.is_empty() {
                eprintln!("No selectors declared in {}", config_path.display());
            }
            let mut all = true;
            for selector in &config.selectors {
                all &= show(&client, &selector.name).await;
            }
            all
        }
        Commands::Defaults => {
            let sync = SelectorSynchronizer::spawn(client.clone());
            match sync.apply_defaults(&config.selectors) {
                Some(ticket) => match ticket.wait().await {
                    Some(report) => {
                        println!("applied {}, failed {}", report.applied, report.failed);
                        report.failed == 0
                    }
                    None => false,
                },
                None => {
                    println!("No selector defaults to apply");
                    true
                }
            }
        }
        Commands::Ping => client.probe().await,
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        eprintln!("Error: control plane request failed");
        ExitCode::FAILURE
    }
}

async fn show(client: &ControlPlaneClient, selector: &str) -> bool {
    match client.selector_state(selector).await {
        Some(now) => {
            println!("{}: {}", selector, now);
            true
        }
        None => {
            println!("{}: unknown", selector);
            false
        }
    }
}
