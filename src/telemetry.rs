//! Telemetry module for logging setup
//!
//! Provides unified logging configuration shared by the binary and tests.

use crate::config::NodeConfig;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Primary log filter (RUST_LOG env var)
    pub log_filter: String,
    /// Fallback log level if RUST_LOG not set
    pub default_level: String,
    /// Log format ("human" or "json")
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Human,
    Json,
}

impl TelemetryConfig {
    /// Create telemetry config with node config for CLI log level support
    pub fn with_node_config(node_config: &NodeConfig) -> Self {
        Self::from_env_with_defaults(node_config.log_level.clone())
    }

    fn from_env_with_defaults(default_level: String) -> Self {
        Self {
            log_filter: env::var("RUST_LOG").unwrap_or_default(),
            default_level,
            log_format: match env::var("LOG_FORMAT")
                .unwrap_or_default()
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Human,
            },
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_env_with_defaults("info".to_string())
    }
}

/// Initialize logging
///
/// Sets up the global tracing subscriber with an EnvFilter for level
/// filtering. Safe to call multiple times - will only initialize once.
pub fn init_logging(config: &TelemetryConfig) {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("tracing subscriber already initialized, skipping");
        return;
    }

    let filter = if config.log_filter.is_empty() {
        EnvFilter::new(&config.default_level)
    } else {
        EnvFilter::new(&config.log_filter)
    };

    let fmt_layer = match config.log_format {
        // NOTE: `tracing-subscriber` JSON formatting requires enabling its `json`
        // feature. For now, keep the "json" option as a compact format.
        LogFormat::Json => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Human => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
