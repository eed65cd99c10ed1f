//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name used as field manager, `managed-by` label value and log target
pub const CONTROLLER_NAME: &str = "auth-gateway-controller";

/// API group of the `AuthUser` and `AuthGateway` custom resources
pub const API_GROUP: &str = "operator.authgateway.io";

/// Finalizer placed on every live `AuthUser`
/// Removed only after owned dependents are cleaned up
pub const USER_FINALIZER: &str = "operator.authgateway.io/user-cleanup";

/// Label marking objects created by this controller
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label carrying the name of the owning resource
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Label carrying the kind of the owning resource (`authuser` or `authgateway`)
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";

/// Annotation holding the SHA-256 of the rendered gateway configuration
pub const ANNOTATION_CONFIG_CHECKSUM: &str = "operator.authgateway.io/config-checksum";

/// Key of the rendered configuration inside the gateway config Secret
pub const CONFIG_SECRET_KEY: &str = "config.yaml";

/// Key of the generated password inside a user credentials Secret
pub const PASSWORD_SECRET_KEY: &str = "password";

/// Key of the username inside a user credentials Secret
pub const USERNAME_SECRET_KEY: &str = "username";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default lower bound of the per-resource error backoff (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default upper bound of the per-resource error backoff (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default number of reconciliations the controller runs in parallel
/// Gateway regeneration is serialized regardless of this value
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default namespace the controller runs in
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "octopilot-system";
