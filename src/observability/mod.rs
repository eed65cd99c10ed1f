//! # Observability
//!
//! - `metrics`: Prometheus metrics collection
//! - `logging`: tracing subscriber setup for structured logs

pub mod metrics;
pub mod logging;

pub use metrics::*;
