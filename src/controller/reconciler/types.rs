//! # Reconciler Types
//!
//! Shared reconciler context, error taxonomy and per-resource backoff state.

use super::cancel::CancellationSignal;
use super::sync::GatewaySyncCoordinator;
use crate::cluster::{
    ClusterStore, FinalizerOps, GatewayRenderer, KubeClusterStore, SecretConfigRenderer,
    StoreError,
};
use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Reconciliation failure; every variant is requeued by the error policy
#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("regenerating gateway {gateway} failed: {source:#}")]
    Regeneration {
        gateway: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("finalizer {operation} failed for {user}: {source}")]
    Finalizer {
        operation: &'static str,
        user: String,
        #[source]
        source: StoreError,
    },

    #[error("reconciliation cancelled by shutdown")]
    Cancelled,
}

impl ReconcilerError {
    /// Nothing is fatal to the process; the watch framework retries every failure
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Stable label for `authgateway_reconciliation_errors_total{kind}`
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            ReconcilerError::Store(StoreError::Conflict { .. }) => "conflict",
            ReconcilerError::Store(_) => "store",
            ReconcilerError::Regeneration { .. } => "regeneration",
            ReconcilerError::Finalizer { .. } => "finalizer",
            ReconcilerError::Cancelled => "cancelled",
        }
    }
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min, max),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Context shared by every reconciliation
#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ClusterStore>,
    pub finalizers: Arc<dyn FinalizerOps>,
    /// Owns the process-wide sync lock
    pub coordinator: GatewaySyncCoordinator,
    /// Backoff state per resource (`namespace/name`), driven by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub cancel: CancellationSignal,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("backoff_min", &self.backoff_min)
            .field("backoff_max", &self.backoff_max)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        finalizers: Arc<dyn FinalizerOps>,
        renderer: Arc<dyn GatewayRenderer>,
        config: &ControllerConfig,
        cancel: CancellationSignal,
    ) -> Self {
        let (backoff_min, backoff_max) = config.backoff_bounds();
        Self {
            coordinator: GatewaySyncCoordinator::new(store.clone(), renderer),
            store,
            finalizers,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            backoff_min,
            backoff_max,
            cancel,
        }
    }

    /// Context wired to the Kubernetes-backed collaborators
    pub fn from_client(
        client: Client,
        config: &ControllerConfig,
        cancel: CancellationSignal,
    ) -> Self {
        let store = Arc::new(KubeClusterStore::new(client.clone()));
        let renderer = Arc::new(SecretConfigRenderer::new(client));
        Self::new(store.clone(), store, renderer, config, cancel)
    }

    /// Record a failure for `resource_key` and return the delay before the retry
    pub fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(|| BackoffState::new(self.backoff_min, self.backoff_max));
                state.increment_error();
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using minimum backoff", e);
                (self.backoff_min, 0)
            }
        }
    }

    /// Forget the failure history of `resource_key` after a success
    pub fn reset_backoff(&self, resource_key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                states.remove(resource_key);
            }
            Err(e) => warn!("Failed to lock backoff_states: {}", e),
        }
    }
}
