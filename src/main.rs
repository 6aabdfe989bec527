//! Relaynode server CLI
//!
//! Run with: `cargo run -- --help`

use clap::Parser;
use relaynode::{clock, init_logging, NodeConfig, NodeServer, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = NodeConfig::parse();

    let telemetry_config = TelemetryConfig::with_node_config(&config);
    init_logging(&telemetry_config);

    // The check itself is fallible and side-effect free; whether a failure
    // aborts startup is decided here, by configuration.
    if let Err(error) = clock::clock_sync_check() {
        if config.require_synced_clock {
            tracing::error!(error = %error, "refusing to start with an unsynchronized clock");
            return Err(error.into());
        }
        tracing::warn!(error = %error, "system clock is not synchronized");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        node_name = %config.node_name,
        addr = %config.listen_addr,
        parent = ?config.parent_node_url,
        session_maker = config.session_maker,
        force_offline_sync = config.force_offline_sync,
        cors = config.cors_enabled,
        "starting relaynode"
    );

    let server = NodeServer::new(config).await?;
    server.run().await.map_err(Into::into)
}
