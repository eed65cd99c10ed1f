//! # Error Policy
//!
//! Maps reconciliation failures to requeues with per-resource Fibonacci backoff,
//! and classifies watch stream errors for logging. The watcher retries stream
//! errors itself; these handlers only decide what gets reported.

use crate::cluster::object_key;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::AuthUser;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Requeue a failed reconciliation after this resource's next backoff step
pub fn handle_reconciliation_error(
    obj: Arc<AuthUser>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error.kind = error.metric_label(),
    );
    let _error_guard = error_span.enter();

    observability::metrics::increment_reconciliation_errors(error.metric_label());

    if matches!(error, ReconcilerError::Cancelled) {
        info!("Reconciliation cancelled by shutdown");
    } else {
        error!(error = %error, "Reconciliation failed");
    }

    let (delay, error_count) = ctx.next_backoff(&object_key(Some(namespace), Some(name)));
    info!(
        delay_secs = delay.as_secs(),
        error_count,
        "Retrying with Fibonacci backoff"
    );

    observability::metrics::increment_requeues(error.metric_label());
    Action::requeue(delay)
}

/// Class of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401/403: credentials or RBAC changed
    Unauthorized,
    /// 410: resource version expired, the watcher relists
    Expired,
    /// 429 or storage reinitializing
    Throttled,
    /// 404: CRD missing or object deleted mid-watch
    NotFound,
    Other,
}

impl WatchErrorClass {
    /// Classify from the debug rendering of a controller error
    #[must_use]
    pub fn classify(error: &str) -> Self {
        // 404s can surface wrapped in WatchFailed, so test them before 401
        let is_not_found = error.contains("ObjectNotFound")
            || error.contains("404")
            || error.contains("not found");
        if (error.contains("401") || error.contains("403") || error.contains("Unauthorized"))
            && !is_not_found
        {
            WatchErrorClass::Unauthorized
        } else if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
            || error.contains("Gone")
        {
            WatchErrorClass::Expired
        } else if error.contains("429")
            || error.contains("storage is (re)initializing")
            || error.contains("TooManyRequests")
        {
            WatchErrorClass::Throttled
        } else if is_not_found {
            WatchErrorClass::NotFound
        } else {
            WatchErrorClass::Other
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WatchErrorClass::Unauthorized => "unauthorized",
            WatchErrorClass::Expired => "expired",
            WatchErrorClass::Throttled => "throttled",
            WatchErrorClass::NotFound => "not_found",
            WatchErrorClass::Other => "other",
        }
    }
}

/// Log a watch stream error at a level matching its class
pub fn handle_watch_stream_error(error: &str) -> WatchErrorClass {
    let class = WatchErrorClass::classify(error);
    match class {
        WatchErrorClass::Unauthorized => {
            error!(error, "Watch authentication failed - check the controller's RBAC bindings");
        }
        WatchErrorClass::Expired => {
            warn!("Watch resource version expired (410), watcher will relist");
        }
        WatchErrorClass::Throttled => {
            warn!(error, "API server throttling or reinitializing storage");
        }
        WatchErrorClass::NotFound => {
            warn!(
                error,
                "Resource not found (404) - normal after deletions, otherwise check the CRDs are installed"
            );
        }
        WatchErrorClass::Other => {
            error!(error, "Controller stream error");
        }
    }
    class
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(
            WatchErrorClass::classify("Api(ErrorResponse { code: 401, reason: \"Unauthorized\" })"),
            WatchErrorClass::Unauthorized
        );
        assert_eq!(
            WatchErrorClass::classify("WatchError: too old resource version"),
            WatchErrorClass::Expired
        );
        assert_eq!(
            WatchErrorClass::classify("code: 429 TooManyRequests"),
            WatchErrorClass::Throttled
        );
        assert_eq!(
            WatchErrorClass::classify("WatchFailed: invalid type: integer `404`"),
            WatchErrorClass::NotFound
        );
        assert_eq!(WatchErrorClass::classify("connection reset"), WatchErrorClass::Other);
    }
}
