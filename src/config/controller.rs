//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_CONTROLLER_NAMESPACE,
    DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
};
use std::str::FromStr;
use std::time::Duration;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "plain" => Ok(Self::Text),
            other => Err(format!("unknown log format '{other}' (expected json or text)")),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Lower bound of the per-resource Fibonacci error backoff (seconds)
    pub backoff_min_secs: u64,
    /// Upper bound of the per-resource Fibonacci error backoff (seconds)
    pub backoff_max_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Maximum concurrent reconciliations
    /// Gateway regeneration passes stay serialized behind the sync lock
    pub max_concurrent_reconciliations: u16,
    /// Namespace where the controller is deployed
    pub controller_namespace: String,
    /// Restrict the `AuthUser` watch to one namespace (`None` = cluster-wide)
    /// Gateway matching is always cluster-wide
    pub watch_namespace: Option<String>,
    /// Default tracing filter directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Enable ANSI colors in text format logs
    pub log_enable_color: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            watch_namespace: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            log_enable_color: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let watch_namespace = env_var_or_default_str("WATCH_NAMESPACE", "");
        Self {
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            controller_namespace: env_var_or_default_str(
                "POD_NAMESPACE",
                DEFAULT_CONTROLLER_NAMESPACE,
            ),
            watch_namespace: (!watch_namespace.is_empty()).then_some(watch_namespace),
            log_level: env_var_or_default_str("LOG_LEVEL", "info").to_lowercase(),
            log_format: env_var_or_default("LOG_FORMAT", LogFormat::Json),
            log_enable_color: env_var_or_default_bool("LOG_ENABLE_COLOR", false),
        }
        .normalized()
    }

    /// Backoff bounds as durations, `(min, max)`
    #[must_use]
    pub fn backoff_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.backoff_min_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }

    /// Get watch restart delay after end duration
    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }

    /// Clamp values that would otherwise stall the controller
    fn normalized(mut self) -> Self {
        self.backoff_min_secs = self.backoff_min_secs.max(1);
        self.backoff_max_secs = self.backoff_max_secs.max(self.backoff_min_secs);
        self.max_concurrent_reconciliations = self.max_concurrent_reconciliations.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoff_bounds() {
        let config = ControllerConfig::default();
        let (min, max) = config.backoff_bounds();
        assert_eq!(min, Duration::from_secs(DEFAULT_BACKOFF_MIN_SECS));
        assert_eq!(max, Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS));
    }

    #[test]
    fn test_normalized_clamps_inverted_bounds() {
        let config = ControllerConfig {
            backoff_min_secs: 0,
            backoff_max_secs: 0,
            max_concurrent_reconciliations: 0,
            ..ControllerConfig::default()
        }
        .normalized();
        assert_eq!(config.backoff_min_secs, 1);
        assert_eq!(config.backoff_max_secs, 1);
        assert_eq!(config.max_concurrent_reconciliations, 1);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
