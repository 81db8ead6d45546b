//! relay-chain server
//!
//! Serves the chain over HTTP, backed by SQLite or an in-memory store.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay_chain::{create_router, Args, BoardStore, ChainService, MemoryChain, SqliteChain};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads the environment
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("relay_chain={},info", args.log_level)));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting relay-chain v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        return Err(e).context("invalid configuration");
    }
    let relay = args.crypto.build_relay()?;

    let store: Arc<dyn BoardStore> = if args.in_memory {
        warn!("Running with in-memory store, the chain is lost on exit");
        Arc::new(MemoryChain::new())
    } else {
        info!(path = %args.db_path.display(), "Opening chain database");
        Arc::new(SqliteChain::open(&args.db_path)?)
    };

    let service = Arc::new(ChainService::new(store, relay));
    let app = create_router(service, args.cors_allow_any);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!("Relay chain listening on http://{}", args.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay chain stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
