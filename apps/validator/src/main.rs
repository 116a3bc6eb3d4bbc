use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use hubwire::crypto::load_or_generate_keypair;
use tracing::info;

mod checker;
mod client;
mod config;

use checker::HttpChecker;
use client::ValidatorClient;
use config::Config;

#[derive(Parser)]
#[command(name = "uppe-validator")]
#[command(about = "Uppe validator - checks sites on behalf of an Uppe hub", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Hub WebSocket URL, overrides the config file
    #[arg(long, value_name = "URL")]
    hub: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let mut config = Config::from_config(cli.config.as_ref())?;
    config.apply_env();
    if let Some(url) = cli.hub {
        config.hub.url = url;
    }
    info!("{}", config);

    let keypair = load_or_generate_keypair(&config.identity.keypair_path).with_context(|| {
        format!("loading validator key from {}", config.identity.keypair_path.display())
    })?;
    info!("Validator public key: {}", keypair.public_key_hex());

    let checker = HttpChecker::new(config.probe.timeout(), config.probe.penalty_latency_ms)?;
    let client = Arc::new(ValidatorClient::new(&config, keypair, Arc::new(checker)));
    let heartbeat = client.spawn_heartbeat();

    tokio::select! {
        _ = client.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("listening for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    heartbeat.abort();
    Ok(())
}
