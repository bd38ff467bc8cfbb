//! # Bridgewatch
//!
//! Watches bridged messaging channels for liveness. Bridge states arrive by
//! push on `POST /` and by polling each bridge's status endpoint; account
//! loops sync their rooms and alert when a bridge stays silent too long.

use std::path::PathBuf;

use anyhow::Context;
use bridgewatch_config::{ConfigLoad, ConfigLoader, DEFAULT_CONFIG_PATH};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridgewatch_server::app;

const DEFAULT_LOG_FILTER: &str =
    "info,bridgewatch_core=debug,bridgewatch_server=debug,tower_http=info";

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "bridgewatch-server")]
#[command(about = "Bridge liveness monitor with debounced alerting")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Path to the configuration file (TOML, or JSON by extension)
    #[arg(short, long, env = "BRIDGEWATCH_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Push endpoint host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Push endpoint port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter directive; falls back to RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate the configuration, print a summary and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = dotenvy::dotenv().is_ok();
    let cli = Cli::parse();

    init_tracing(cli.serve.log_filter.as_deref());
    if env_file_loaded {
        info!("loaded .env file");
    }

    let load = load_config(&cli.serve)?;

    match cli.command {
        Some(Command::CheckConfig) => {
            print_summary(&load);
            Ok(())
        }
        None => app::run(load.config, shutdown_signal()).await,
    }
}

fn init_tracing(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => tracing_subscriber::EnvFilter::new(directive),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(args: &ServeArgs) -> anyhow::Result<ConfigLoad> {
    let mut load = ConfigLoader::new(&args.config)
        .load()
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    if let Some(host) = &args.host {
        load.config.listen.host = host.clone();
    }
    if let Some(port) = args.port {
        load.config.listen.port = port;
    }
    Ok(load)
}

fn print_summary(load: &ConfigLoad) {
    let config = &load.config;
    println!("config: {}", load.path.display());
    println!("listen: {}:{}", config.listen.host, config.listen.port);
    for (bridge_id, bridge) in &config.bridges {
        let source = if bridge.settings.status_endpoint_url.is_some() {
            "poll+push"
        } else {
            "push only"
        };
        println!("bridge {bridge_id} ({source}): {} account(s)", bridge.accounts.len());
    }
    for (account_id, account) in &config.accounts {
        println!(
            "account {account_id}: {} watched bridge(s)",
            account.watch.watched_bridges.len()
        );
    }
    match &config.notify.room {
        Some(room) => println!("notify: {} as {}", room.room_id, room.account_id),
        None => println!("notify: log only"),
    }
    for warning in load.warnings.iter() {
        println!("warning: {warning}");
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
