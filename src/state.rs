//! Application state shared across request handlers
//!
//! Constructed once by the composition root and shared via `Arc` through
//! axum's State extractor. The sync worker holds the same `Arc`, so the
//! ingestion handlers and the worker see one store, one clock, and one
//! activity signal.

use crate::addressing::{compose_path, NodeIdentity};
use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::store::{generate_session_name, Store, StoreError};
use crate::sync::RecordActivity;
use serde_json::Value as JsonValue;
use std::time::Instant;

/// Shared application state.
pub struct AppState {
    /// Local store (records, messages, sessions)
    pub store: Store,

    /// Node configuration
    pub config: NodeConfig,

    /// Identity of this node in the cluster's path namespace
    pub identity: NodeIdentity,

    /// Node clock source
    pub clock: Clock,

    /// Record-receipt signal feeding the sync worker's live/offline mode
    pub activity: RecordActivity,

    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state from config, opening the store.
    pub async fn new(config: NodeConfig) -> Result<Self, StoreError> {
        let store = Store::open(config.db_path.clone()).await?;
        let identity = NodeIdentity::new(config.node_name.clone(), config.session_maker);

        Ok(Self {
            store,
            config,
            identity,
            clock: Clock::new(),
            activity: RecordActivity::new(),
            start_time: Instant::now(),
        })
    }

    /// Get server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Ingest a message under this node's current instance.
    ///
    /// Ensures the environment has a current session (creating one with an
    /// autogenerated name on first write), composes the full path from the
    /// node instance and the caller-visible suffix, stamps the message with
    /// the node clock, and appends it. Returns the assigned timestamp.
    ///
    /// Shared by the HTTP ingest handler and the sync worker's message
    /// tail, which re-derives local addressing for pulled messages.
    pub async fn create_message(
        &self,
        environment_key: &str,
        path_suffix: &str,
        data: JsonValue,
    ) -> Result<i64, StoreError> {
        let created_at = self.clock.now_micros();
        self.store
            .get_or_create_current_session(
                environment_key.to_string(),
                generate_session_name(created_at),
                created_at,
            )
            .await?;

        let full_path = compose_path(&self.identity.instance(), path_suffix);
        let ts = self.clock.now_micros();
        self.store
            .insert_message(environment_key.to_string(), full_path, ts, data)
            .await?;
        Ok(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PathMatch;
    use serde_json::json;

    #[tokio::test]
    async fn create_message_vivifies_session_and_prefixes_path() {
        let config = NodeConfig {
            node_name: "ground".to_string(),
            ..Default::default()
        };
        let state = AppState::new(config).await.expect("state");

        let ts = state
            .create_message("env", "valves/main", json!({"open": true}))
            .await
            .expect("create");

        // First write created a session.
        let sessions = state
            .store
            .list_sessions("env".into(), None, None)
            .await
            .expect("list");
        assert_eq!(sessions.len(), 1);

        // Second write reuses it.
        state
            .create_message("env", "valves/main", json!({"open": false}))
            .await
            .expect("create");
        let sessions = state
            .store
            .list_sessions("env".into(), None, None)
            .await
            .expect("list");
        assert_eq!(sessions.len(), 1);

        // The stored path is namespaced by the node instance.
        let message = state
            .store
            .next_message(
                "env".into(),
                PathMatch::Exact("ground/valves/main".into()),
                None,
            )
            .await
            .expect("next")
            .expect("some");
        assert_eq!(message.ts, ts);
    }
}
