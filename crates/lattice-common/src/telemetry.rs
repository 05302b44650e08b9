//! Tracing subscriber initialization
//!
//! Every log line is emitted through `tracing`; the tracking id of a run is a
//! span field, so it shows up on every event inside an operation.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::Error;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,lattice_traffic=info,kube=warn,tower=warn,hyper=warn";

/// Configuration for telemetry initialization
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Filter directive overriding `RUST_LOG` (e.g., "debug")
    pub filter: Option<String>,
}

/// Resolve the filter: explicit directive, then `RUST_LOG`, then [`DEFAULT_FILTER`]
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, Error> {
    match &config.filter {
        Some(directive) => EnvFilter::try_new(directive)
            .map_err(|e| Error::config(format!("invalid log filter '{}': {}", directive, e))),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Initialize the global tracing subscriber
///
/// # Example
///
/// ```ignore
/// use lattice_common::telemetry::{init_telemetry, TelemetryConfig};
///
/// init_telemetry(&TelemetryConfig { json: true, ..Default::default() })?;
/// ```
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), Error> {
    let filter = env_filter(config)?;

    let (json_layer, text_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true);
        (Some(layer), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_target(false)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| Error::internal_with_context("telemetry", e.to_string()))
}
