//! # Reconcile
//!
//! Top-level reconciliation of one `AuthUser`.
//!
//! 1. Re-fetch the user; gone means done
//! 2. Live user: ensure the cleanup marker
//! 3. Sync every gateway that selects the user
//! 4. Deleting user: delete owned dependents, remove the marker
//! 5. Live user: refresh status
//!
//! Every step is idempotent, so replays and out-of-order invocations converge.

use super::status::update_user_status;
use super::types::{Reconciler, ReconcilerError};
use crate::cluster::object_key;
use crate::controller::finalizer::{ensure_marker, finalize_user, UserLifecycle};
use crate::crd::AuthUser;
use crate::observability;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Instrument};

/// Watch-framework entry point
pub async fn reconcile(
    user: Arc<AuthUser>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let identity = ObjectRef::from_obj(user.as_ref());
    let span = tracing::info_span!(
        "controller.reconcile",
        resource.namespace = identity.namespace.as_deref().unwrap_or("default"),
        resource.name = identity.name.as_str(),
    );

    let started = Instant::now();
    observability::metrics::increment_reconciliations();
    let result = reconcile_identity(&identity, &ctx).instrument(span).await;
    observability::metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());
    result
}

/// Reconcile the user named by `identity` against current store state
pub async fn reconcile_identity(
    identity: &ObjectRef<AuthUser>,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    let key = object_key(identity.namespace.as_deref(), Some(&identity.name));
    let cancel = &ctx.cancel;

    let Some(user) = cancel.guard(ctx.store.get_user(identity)).await? else {
        debug!("User no longer exists, nothing to do");
        ctx.reset_backoff(&key);
        return Ok(Action::await_change());
    };

    let lifecycle = UserLifecycle::of(&user);
    debug!(lifecycle = lifecycle.as_str(), "reconcile.start");

    if lifecycle == UserLifecycle::Finalized {
        // Another finalizer still holds the object; our part is done
        ctx.reset_backoff(&key);
        return Ok(Action::await_change());
    }

    if !lifecycle.is_deleting() {
        cancel.guard(ensure_marker(ctx.finalizers.as_ref(), &user)).await?;
    }

    let report = ctx.coordinator.sync_for_user(&user, cancel).await?;

    if lifecycle.is_deleting() {
        cancel.guard(finalize_user(ctx.finalizers.as_ref(), &user)).await?;
        info!(gateways = report.matched.len(), "User removed from gateways");
        ctx.reset_backoff(&key);
        return Ok(Action::await_change());
    }

    update_user_status(ctx, &user, &report).await;
    ctx.reset_backoff(&key);

    debug!(
        gateways = report.matched.len(),
        skipped_invalid = report.skipped_invalid.len(),
        "reconcile.success"
    );
    Ok(Action::await_change())
}
