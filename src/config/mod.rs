//! # Configuration
//!
//! Controller and HTTP server settings.
//!
//! Both are read once at startup from environment variables (populated from a
//! ConfigMap via `envFrom` in the deployment) and may be overridden by CLI flags.

mod controller;
mod server;

pub use controller::{ControllerConfig, LogFormat};
pub use server::ServerConfig;

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
pub(crate) fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |v| parse_bool(&v))
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_accepts_common_truthy_values() {
        for value in ["true", "TRUE", "1", "yes", "On"] {
            assert!(parse_bool(value), "{value} should parse as true");
        }
    }

    #[test]
    fn test_parse_bool_rejects_everything_else() {
        for value in ["false", "0", "no", "off", "", "maybe"] {
            assert!(!parse_bool(value), "{value} should parse as false");
        }
    }
}
