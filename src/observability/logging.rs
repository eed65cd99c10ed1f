//! # Logging
//!
//! `tracing` subscriber setup. `RUST_LOG` wins when set; otherwise the configured
//! log level applies to this crate only.

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER_TARGET: &str = "auth_gateway_controller";

/// Filter used when `RUST_LOG` is unset
fn default_filter(log_level: &str) -> String {
    format!("{DEFAULT_FILTER_TARGET}={}", log_level.to_lowercase())
}

/// Install the global subscriber
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing(
    format: LogFormat,
    log_level: &str,
    with_color: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_ansi(with_color)
            .with_env_filter(filter)
            .try_init(),
    }
}
