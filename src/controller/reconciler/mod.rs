//! # Reconciler
//!
//! Core reconciliation logic for `AuthUser` resources.
//!
//! The reconciler:
//! - Keeps a cleanup finalizer on every live `AuthUser`
//! - Regenerates each `AuthGateway` whose selectors accept the user, one pass at a time
//! - Deletes owned credential Secrets and releases the finalizer on deletion
//! - Updates user status with the number of gateways serving it

pub mod cancel;
pub mod reconcile;
pub mod status;
pub mod sync;
pub mod types;

pub use cancel::{cancellation, CancellationHandle, CancellationSignal};
pub use reconcile::{reconcile, reconcile_identity};
pub use sync::{GatewaySyncCoordinator, SyncReport};
pub use types::{BackoffState, Reconciler, ReconcilerError};
