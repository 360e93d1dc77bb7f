//! # MQ Telemetry
//!
//! Observability for Quantum-MQ.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` registry with env filter and pretty or
//!   JSON output
//! - **Metrics**: Prometheus counters, gauges and histograms in a global
//!   registry, updated by the transport and engine crates
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mq_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//!
//!     // Application code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MQ_SERVICE_NAME` | `quantum-mq` | Service name attached to logs |
//! | `MQ_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `MQ_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `MQ_JSON_LOGS` | `false` | JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{gather_text, register_metrics, MetricsHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Initialize metrics first so early log lines can already count.
    let metrics = register_metrics()?;
    init_logging(config)?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    Ok(TelemetryGuard { _metrics: metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
