//! Node configuration

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Relaynode HTTP server configuration
///
/// Every option can be set via CLI flag or environment variable. A node with
/// `--parent-node-url` set replicates everything it receives upstream; a node
/// without one is a cluster root (or a standalone deployment).
#[derive(Parser, Debug, Clone)]
#[command(name = "relaynode")]
#[command(about = "Hierarchical telemetry collection node")]
pub struct NodeConfig {
    /// Address to listen on
    #[arg(long, env = "RELAY_LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: SocketAddr,

    /// Name of this node, used as the first segment of message paths
    #[arg(long, env = "RELAY_NODE_NAME", default_value = "node")]
    pub node_name: String,

    /// Path to the SQLite database file (in-memory store when unset)
    #[arg(long, env = "RELAY_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Base URL of the parent node to replicate to (e.g. http://parent:3000).
    /// When unset, no sync worker is started.
    #[arg(long, env = "RELAY_PARENT_NODE_URL")]
    pub parent_node_url: Option<String>,

    /// Whether this node mints sessions. Session makers get a local session
    /// token appended to their node instance and may POST /sessions/create.
    #[arg(long, env = "RELAY_SESSION_MAKER")]
    pub session_maker: bool,

    /// Force offline (high-throughput) sync regardless of recent activity
    #[arg(long, env = "RELAY_FORCE_OFFLINE_SYNC")]
    pub force_offline_sync: bool,

    /// Refuse to start unless the system clock reports as synchronized
    #[arg(long, env = "RELAY_REQUIRE_SYNCED_CLOCK")]
    pub require_synced_clock: bool,

    /// Enable CORS (Cross-Origin Resource Sharing)
    #[arg(long, env = "RELAY_CORS_ENABLED", default_value = "true")]
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".parse().expect("valid default listen addr"),
            node_name: "node".to_string(),
            db_path: None,
            parent_node_url: None,
            session_maker: false,
            force_offline_sync: false,
            require_synced_clock: false,
            cors_enabled: true,
            log_level: "info".to_string(),
        }
    }
}
