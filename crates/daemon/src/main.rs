//! txbridge - Main Entry Point
//! Loads configuration, wires the persistence runtime and remote client, and serves the remote endpoint

mod config;
mod wiring;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::BridgeProperties;
use txbridge_api_rpc::RopServer;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging() -> Result<()> {
    let log_format = std::env::var("TXBRIDGE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("txbridge=info"))?;

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    init_logging()?;
    info!("txbridge v{} starting...", VERSION);

    // 2. Load configuration
    let props = BridgeProperties::load()?;

    // 3. Wire runtime, transaction binding, endpoint and client
    let client = wiring::connect_client(&props)?;
    let bridge = wiring::assemble(&props).await?;
    if bridge.is_none() && client.is_none() {
        info!("Neither a persistence runtime nor a remote client is configured");
        return Ok(());
    }
    if client.is_some() {
        info!("Remote persistence client ready");
    }
    let (runtime, remote) = match bridge {
        Some(bridge) => (Some(bridge.runtime), bridge.remote),
        None => (None, None),
    };

    // 4. Serve the remote endpoint, if configured
    let rpc_handle = match remote {
        Some((service, config)) => {
            let (handle, _) = RopServer::new(config, service)
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;
            Some(handle)
        }
        None => None,
    };

    info!("System ready. Press Ctrl+C to shutdown");

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    if let Some(handle) = rpc_handle {
        handle
            .stop()
            .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
        handle.stopped().await;
    }
    if let Some(runtime) = runtime {
        runtime.close().await;
    }

    info!("Shutdown complete.");
    Ok(())
}
