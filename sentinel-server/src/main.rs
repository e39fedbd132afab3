//! DeFi Sentinel membership server.
//!
//! Hosts the chain listener that keeps the off-chain membership/badge
//! ledger in sync with on-chain events, plus a small HTTP surface for
//! reading ledger state and triggering manual reconciliation.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::FileConfig;
use sentinel_core::chain::{ChainClient, Endpoints, RpcClient};
use sentinel_core::ledger::{Ledger, MemoryLedger};
use sentinel_core::processors::{ChainListener, ReconciliationScanner};
use sentinel_core::reducer::EventReducer;
use server::{build_router, run_server};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// DeFi Sentinel - on-chain membership and badge ledger sync
#[derive(Parser, Debug)]
#[command(name = "sentinel-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./sentinel-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Override the node endpoint
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting sentinel-server v{}", env!("CARGO_PKG_VERSION"));

    let mut file_config = FileConfig::load(&args.config).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    if let Some(rpc_url) = args.rpc_url {
        file_config.listener.rpc_url = rpc_url;
    }
    let listen_addr = args.listen.unwrap_or(file_config.server.listen);
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Wire the core subsystem: ledger, reducer, chain client, listener.
    let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
    let reducer = Arc::new(EventReducer::new(ledger.clone()));

    let endpoints = Endpoints::derive(&file_config.listener.rpc_url)?;
    let client: Arc<dyn ChainClient> = Arc::new(RpcClient::new(endpoints.http.clone()));

    let listener = Arc::new(ChainListener::new(
        file_config.listener.clone(),
        client.clone(),
        reducer.clone(),
    )?);
    listener.start();

    let scanner = Arc::new(ReconciliationScanner::new(
        client,
        reducer,
        &file_config.listener,
    ));

    let state = AppState::new(ledger, scanner, listener.clone());
    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    tracing::info!("Stopping chain listener...");
    listener.stop();
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tokio_tungstenite=warn,tungstenite=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
