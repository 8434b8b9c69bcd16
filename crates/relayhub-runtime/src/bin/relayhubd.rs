//! relayhub daemon (`relayhubd`)
//!
//! Runs the hub over a UDP link, with state kept in a data directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use relayhub_core::HubResult;
use relayhub_runtime::{init_logging, Hub, HubConfig, LoggingActuator};
use relayhub_store::FileStore;
use relayhub_time::SystemClock;
use relayhub_transport::UdpLink;

const INBOUND_BUFFER: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "relayhubd", version, about = "Relay hub daemon")]
struct Args {
    /// JSON config file; defaults apply when omitted
    #[arg(long, env = "RELAYHUB_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("relayhubd: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> HubResult<()> {
    let config = match &args.config {
        Some(path) => HubConfig::load(path)?,
        None => HubConfig::default(),
    };
    init_logging(&config.log)?;
    tracing::info!("relayhubd v{} starting", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(FileStore::open(&config.data_dir)?);
    let link = Arc::new(
        UdpLink::bind(config.bind, config.own_address)
            .await?
            .with_max_peers(config.max_nodes),
    );
    for route in &config.routes {
        link.add_route(route.address, route.endpoint);
    }
    let inbound = link.start_receive_loop(INBOUND_BUFFER);
    tracing::info!("link up on {} as {}", link.local_addr(), link.own_address());

    let hub = Hub::new(
        &config,
        link,
        Arc::new(LoggingActuator::new()),
        store,
        Arc::new(SystemClock::new()),
    );
    hub.start();

    hub.run(inbound, shutdown_signal()).await;
    tracing::info!("relayhubd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for ctrl-c, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
