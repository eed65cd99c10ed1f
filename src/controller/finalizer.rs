//! # Finalizer Lifecycle
//!
//! Two-flag state machine over an `AuthUser`: deletion requested, and cleanup
//! marker present.
//!
//! ```text
//! ActiveUnmarked --add marker--> Active
//! Finalizing --delete dependents, remove marker--> Finalized
//! ```
//!
//! A failed step leaves the marker in place, so Kubernetes cannot drop the user
//! until a later reconcile completes cleanup.

use crate::cluster::{object_key, FinalizerOps};
use crate::constants::USER_FINALIZER;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::AuthUser;
use crate::observability;
use kube::ResourceExt;
use tracing::info;

/// Lifecycle position derived from (deletion requested, marker present)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLifecycle {
    /// Live, marker missing
    ActiveUnmarked,
    /// Live, marker present
    Active,
    /// Deletion requested, cleanup pending
    Finalizing,
    /// Deletion requested, cleanup done
    Finalized,
}

impl UserLifecycle {
    #[must_use]
    pub fn of(user: &AuthUser) -> Self {
        match (is_deleting(user), has_marker(user)) {
            (false, false) => UserLifecycle::ActiveUnmarked,
            (false, true) => UserLifecycle::Active,
            (true, true) => UserLifecycle::Finalizing,
            (true, false) => UserLifecycle::Finalized,
        }
    }

    #[must_use]
    pub fn is_deleting(self) -> bool {
        matches!(self, UserLifecycle::Finalizing | UserLifecycle::Finalized)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UserLifecycle::ActiveUnmarked => "active-unmarked",
            UserLifecycle::Active => "active",
            UserLifecycle::Finalizing => "finalizing",
            UserLifecycle::Finalized => "finalized",
        }
    }
}

/// Whether the cleanup marker is present
#[must_use]
pub fn has_marker(user: &AuthUser) -> bool {
    user.finalizers().iter().any(|f| f == USER_FINALIZER)
}

#[must_use]
pub fn is_deleting(user: &AuthUser) -> bool {
    user.metadata.deletion_timestamp.is_some()
}

fn finalizer_error(
    operation: &'static str,
    user: &AuthUser,
    source: crate::cluster::StoreError,
) -> ReconcilerError {
    ReconcilerError::Finalizer {
        operation,
        user: object_key(user.metadata.namespace.as_deref(), user.metadata.name.as_deref()),
        source,
    }
}

/// Add the marker to a live user; no-op when present
pub async fn ensure_marker(ops: &dyn FinalizerOps, user: &AuthUser) -> Result<(), ReconcilerError> {
    if has_marker(user) {
        return Ok(());
    }
    ops.add_marker(user)
        .await
        .map_err(|e| finalizer_error("add_marker", user, e))?;
    observability::metrics::increment_finalizer_operations("add_marker");
    Ok(())
}

/// Delete owned dependents, then remove the marker
///
/// No-op unless the user is [`UserLifecycle::Finalizing`]. The marker is only
/// removed once every dependent is gone.
pub async fn finalize_user(ops: &dyn FinalizerOps, user: &AuthUser) -> Result<(), ReconcilerError> {
    if UserLifecycle::of(user) != UserLifecycle::Finalizing {
        return Ok(());
    }

    let deleted = ops
        .delete_owned_dependents(user)
        .await
        .map_err(|e| finalizer_error("delete_owned_dependents", user, e))?;
    observability::metrics::increment_finalizer_operations("delete_owned_dependents");

    ops.remove_marker(user)
        .await
        .map_err(|e| finalizer_error("remove_marker", user, e))?;
    observability::metrics::increment_finalizer_operations("remove_marker");

    let namespace = user.namespace().unwrap_or_else(|| "default".to_string());
    let name = user.name_any();
    info!(
        resource.namespace = namespace.as_str(),
        resource.name = name.as_str(),
        dependents_deleted = deleted,
        "User cleanup complete, finalizer removed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::AuthUserSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn user(deleting: bool, finalizers: &[&str]) -> AuthUser {
        let mut user = AuthUser::new("u1", AuthUserSpec::default());
        user.metadata.namespace = Some("ns1".to_string());
        if deleting {
            let requested: Time = serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z"))
                .expect("valid RFC 3339 timestamp");
            user.metadata.deletion_timestamp = Some(requested);
        }
        user.metadata.finalizers = Some(finalizers.iter().map(|f| f.to_string()).collect());
        user
    }

    #[test]
    fn test_lifecycle_states() {
        assert_eq!(UserLifecycle::of(&user(false, &[])), UserLifecycle::ActiveUnmarked);
        assert_eq!(
            UserLifecycle::of(&user(false, &[USER_FINALIZER])),
            UserLifecycle::Active
        );
        assert_eq!(
            UserLifecycle::of(&user(true, &[USER_FINALIZER])),
            UserLifecycle::Finalizing
        );
        assert_eq!(
            UserLifecycle::of(&user(true, &["other.io/finalizer"])),
            UserLifecycle::Finalized
        );
    }

    #[test]
    fn test_foreign_finalizers_are_not_the_marker() {
        assert!(!has_marker(&user(false, &["other.io/finalizer"])));
        assert!(has_marker(&user(false, &["other.io/finalizer", USER_FINALIZER])));
    }

    #[test]
    fn test_is_deleting() {
        assert!(UserLifecycle::Finalized.is_deleting());
        assert!(!UserLifecycle::Active.is_deleting());
    }
}
