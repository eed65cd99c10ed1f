//! # User Status
//!
//! Best-effort `AuthUser` status after a successful sync. Writes are skipped when
//! nothing but timestamps would change, so replaying a reconcile against
//! unchanged state produces no store writes and no extra watch events.

use super::sync::SyncReport;
use super::types::Reconciler;
use crate::crd::{AuthUser, AuthUserStatus, Condition};
use kube::ResourceExt;
use tracing::{debug, warn};

pub const PHASE_READY: &str = "Ready";
pub const PHASE_DISABLED: &str = "Disabled";

/// Status the user should carry after `report`
#[must_use]
pub fn desired_status(user: &AuthUser, report: &SyncReport, now: &str) -> AuthUserStatus {
    let matched = i32::try_from(report.matched.len()).unwrap_or(i32::MAX);
    let (phase, reason, message) = if user.spec.disabled {
        (
            PHASE_DISABLED,
            "UserDisabled",
            "User is disabled and excluded from gateway configuration".to_string(),
        )
    } else {
        (
            PHASE_READY,
            "Synced",
            format!("Selected by {matched} gateway(s)"),
        )
    };

    let previous = user
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == "Ready"));
    let condition_unchanged = previous.is_some_and(|c| {
        c.status == "True"
            && c.reason.as_deref() == Some(reason)
            && c.message.as_deref() == Some(message.as_str())
    });
    let last_transition_time = if condition_unchanged {
        previous.and_then(|c| c.last_transition_time.clone())
    } else {
        Some(now.to_string())
    };

    AuthUserStatus {
        phase: Some(phase.to_string()),
        conditions: vec![Condition {
            r#type: "Ready".to_string(),
            status: "True".to_string(),
            last_transition_time,
            reason: Some(reason.to_string()),
            message: Some(message),
        }],
        observed_generation: user.metadata.generation,
        matched_gateways: Some(matched),
        last_sync_time: Some(now.to_string()),
    }
}

/// Patch the user status when it differs; failures are logged, never returned
pub async fn update_user_status(ctx: &Reconciler, user: &AuthUser, report: &SyncReport) {
    let desired = desired_status(user, report, &chrono::Utc::now().to_rfc3339());
    let name = user.name_any();

    if user
        .status
        .as_ref()
        .is_some_and(|current| current.same_observation(&desired))
    {
        debug!(resource.name = name.as_str(), "Skipping status update - unchanged");
        return;
    }

    if let Err(e) = ctx.cancel.guard(ctx.store.patch_user_status(user, &desired)).await {
        warn!(
            resource.name = name.as_str(),
            error = %e,
            "Failed to update AuthUser status"
        );
    }
}
