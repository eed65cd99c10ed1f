//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use auth_gateway_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Cluster seams - implemented by the Kubernetes backend and by test fakes
pub use crate::cluster::{ClusterStore, FinalizerOps, GatewayRenderer, NamespaceIndex, StoreError};

// Reconciler types
pub use crate::controller::reconciler::{
    cancellation, reconcile, reconcile_identity, CancellationHandle, CancellationSignal,
    GatewaySyncCoordinator, Reconciler, ReconcilerError, SyncReport,
};

// Selector matching
pub use crate::controller::selector::{matches, GatewaySelector, SelectorError};

// Config types
pub use crate::config::{ControllerConfig, LogFormat, ServerConfig};
