//! Tracing subscriber setup.

use honeycomb_core::{HoneycombError, HoneycombResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `"honeycomb_cache=debug,info"`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var("HONEYCOMB_LOG").unwrap_or_else(|_| "info".to_string()),
            json: std::env::var("HONEYCOMB_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
        }
    }
}

/// Install the global subscriber. Returns `Ok(false)` when one was already
/// installed.
pub fn init_tracing(config: &TelemetryConfig) -> HoneycombResult<bool> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| HoneycombError::other(format!("Invalid log filter '{}': {}", config.filter, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    match installed {
        Ok(()) => {
            tracing::info!(filter = %config.filter, json = config.json, "Telemetry initialized");
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}
