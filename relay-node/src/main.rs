mod cli;
mod config;

use std::sync::Arc;

use clap::Parser;
use relay_core::{CancelToken, ChainSource, Engine, MemoryChain, Relay, RequestManager, RescanDriver};
use relay_server::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::Args::parse();
    let mut cfg = config::RelayConfig::load(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        cfg.data_dir = Some(data_dir);
    }
    if let Some(bind) = args.bind {
        cfg.bind = bind;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cfg.log_filter.clone()))
        .init();

    let data_dir = cfg.data_dir.clone().ok_or_else(|| {
        "data_dir must be set via config file, RELAY_DATA_DIR, or --data-dir".to_string()
    })?;
    let filter_params = cfg.filter_params();
    let relay = Relay::open(&data_dir, filter_params)?;
    let requests = Arc::new(RequestManager::new(relay.clone()));
    let engine = Arc::new(Engine::new(relay.clone()));

    // The real chain collaborator (a bitcoind RPC/ZMQ client) is out of
    // scope for this crate; `MemoryChain` is the stand-in a host process
    // would replace with its own `ChainSource` implementation.
    let chain: Arc<dyn ChainSource> = Arc::new(MemoryChain::new());

    if let Some(cli::Command::Rescan { from }) = args.command {
        let driver = RescanDriver::new(chain.as_ref(), engine.as_ref());
        let next = driver.run(from, &CancelToken::new(), None).await?;
        tracing::info!(from, next_height = next, "rescan complete");
        return Ok(());
    }

    let state = AppState {
        relay,
        requests,
        engine,
        chain,
        api_key: cfg.api_key.clone(),
        filter_params,
    };
    let router = relay_server::router(state);

    let listener = tokio::net::TcpListener::bind(cfg.bind.as_str()).await?;
    tracing::info!(bind = %cfg.bind, "relay-node listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("shutdown signal received, stopping relay-node");
}
