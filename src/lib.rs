//! Relaynode: a hierarchical telemetry collection node
//!
//! Each node accepts time-series records and point-to-point messages scoped
//! to an environment and a session, and optionally replicates everything it
//! receives to a single parent node, eventually-consistently.
//!
//! # Example
//!
//! ```ignore
//! use relaynode::{NodeConfig, NodeServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = NodeConfig::default();
//!     let server = NodeServer::new(config).await.unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod addressing;
pub mod clock;
pub mod config;
pub mod error;
pub mod query;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use state::AppState;
pub use sync::{ParentClient, SyncWorker};
pub use telemetry::{init_logging, TelemetryConfig};

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Relaynode HTTP server
pub struct NodeServer {
    /// Application state
    state: Arc<AppState>,
    /// Configured router
    router: Router,
}

impl NodeServer {
    /// Create a new server with the given configuration
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let state = Arc::new(AppState::new(config).await?);
        let router = routes::build_router(state.clone());

        Ok(Self { state, router })
    }

    /// Get a reference to the application state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the router for testing
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server
    pub async fn run(self) -> std::io::Result<()> {
        let addr = self.state.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;

        // Start the sync worker if a parent node is configured
        let sync_task = self.state.config.parent_node_url.as_ref().map(|url| {
            let worker = SyncWorker::new(self.state.clone(), ParentClient::new(url.clone()));
            worker.spawn()
        });

        info!(
            addr = %addr,
            node_name = %self.state.config.node_name,
            instance = %self.state.identity.instance(),
            parent = ?self.state.config.parent_node_url,
            session_maker = self.state.config.session_maker,
            "relaynode server starting"
        );

        let result = axum::serve(listener, self.router).await;

        // Cancel the sync worker on shutdown
        if let Some(task) = sync_task {
            task.abort();
        }

        result
    }
}
