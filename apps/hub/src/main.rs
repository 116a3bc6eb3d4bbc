use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

mod config;
mod database;
mod error;
mod hub;
mod pool;
mod server;

use config::Config;
use database::Store;
use error::AppError;
use hub::{DispatchSettings, Hub};
use server::AppState;

#[derive(Parser)]
#[command(name = "uppe-hub")]
#[command(about = "Uppe hub - coordinates validators checking monitored sites", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hub (default)
    Serve,

    /// Register a site for validators to check
    AddSite {
        /// http(s) URL to check
        url: String,

        /// Id of the owning user
        #[arg(long, default_value = "local")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let mut config = Config::from_config(cli.config.as_ref())?;
    config.apply_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run(config).await,
        Commands::AddSite { url, owner } => add_site(&config, &url, &owner).await,
    }
}

async fn run(config: Config) -> Result<(), AppError> {
    info!("{}", config);

    let store: Arc<dyn Store> = Arc::new(
        database::open_store(&config.database.path)
            .await
            .with_context(|| format!("opening database at {}", config.database.path))?,
    );
    let hub = Arc::new(Hub::from_config(store, &config));

    let dispatch_handle = hub.dispatcher(DispatchSettings::from(&config.dispatch)).spawn();
    let sweeper_handle = hub
        .correlation()
        .spawn_sweeper(config.correlation.stale_after(), config.correlation.sweep_interval());

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Hub listening on {} (protocol {})", addr, hubwire::PROTOCOL_VERSION);

    let state = AppState {
        hub: Arc::clone(&hub),
        outbound_capacity: config.dispatch.outbound_queue_capacity,
    };
    let served = server::serve(listener, state, shutdown_signal()).await;

    dispatch_handle.abort();
    sweeper_handle.abort();
    info!("Hub stopped");

    Ok(served?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn add_site(config: &Config, url: &str, owner: &str) -> Result<(), AppError> {
    let parsed = url::Url::parse(url).with_context(|| format!("invalid url {url}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!("only http and https sites can be checked, got {}", parsed.scheme()).into());
    }

    let store = database::open_store(&config.database.path).await?;
    let site = store.create_site(parsed.as_str(), owner).await?;
    info!(site_id = %site.id, url = %site.url, "Site added");
    println!("{}", site.id);

    Ok(())
}
