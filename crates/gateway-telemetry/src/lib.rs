//! # Gateway Telemetry
//!
//! Structured logging via `tracing` and Prometheus metrics for gateway calls.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogContext, LogFormat, LoggingConfig, LoggingError};
pub use metrics::{ActiveCall, CallOutcome, Metrics, MetricsConfig};
