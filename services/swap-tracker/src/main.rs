mod rpc;
mod state;

use std::sync::Arc;

use order_book::{BookConfig, SwapTracker, TrackerConfig};
use rpc::JsonRpcReader;
use state::TrackerState;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "swap_tracker=info,order_book=info".into()))
        .init();

    tracing::info!("Starting swap tracker v{}", env!("CARGO_PKG_VERSION"));

    let book_config = BookConfig::from_env();
    let tracker_config = TrackerConfig::from_env();
    let state = TrackerState::connect(book_config).await?;
    tracing::info!(backend = ?state.backend, "order book store ready");

    let chain = Arc::new(JsonRpcReader::new(tracker_config.rpc_url.clone()));
    let tracker = Arc::new(SwapTracker::new(state.service, chain, tracker_config));

    let (shutdown, signal) = watch::channel(false);
    let worker = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        async move { tracker.run(signal).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown.send(true)?;
    worker.await?;

    Ok(())
}
