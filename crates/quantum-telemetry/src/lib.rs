//! # Quantum Telemetry
//!
//! Logging and Prometheus metrics for the gossip pipeline.
//!
//! - **logging**: one global `tracing-subscriber` registry, filter built from
//!   the environment (see [`TelemetryConfig`]), JSON or pretty lines
//! - **metrics**: [`GossipMetrics`], the `qc_gossip_*` families for admission
//!   queues, verdicts, side effects, peer reports and score parameters
//!
//! ```rust,ignore
//! use quantum_telemetry::{init_logging, metrics, TelemetryConfig};
//!
//! init_logging(&TelemetryConfig::from_env())?;
//! // serve on /metrics
//! let body = metrics().encode()?;
//! ```
//!
//! Tests build their own `GossipMetrics::new()` so counters start at zero
//! and never collide with the process-wide registry.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
mod metrics;

pub use config::{LogFormat, TelemetryConfig, PIPELINE_TARGET};
pub use logging::{init_logging, LoggingInit};
pub use metrics::{metrics, GossipMetrics};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics registration failed: {0}")]
    MetricsInit(String),

    #[error("Bad telemetry configuration: {0}")]
    Config(String),
}
