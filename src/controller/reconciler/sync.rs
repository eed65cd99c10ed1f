//! # Gateway Sync Coordinator
//!
//! For one user change: list every gateway, keep the ones whose selectors accept
//! the user, and regenerate each of them from its full matched user set.
//!
//! A single process-wide lock covers the whole list, match and regenerate
//! sequence, so two passes never interleave their reads and writes of the
//! shared gateway configuration.

use super::cancel::CancellationSignal;
use super::types::ReconcilerError;
use crate::cluster::{object_key, ClusterStore, GatewayRenderer, NamespaceIndex};
use crate::controller::finalizer::{has_marker, is_deleting};
use crate::controller::selector::{GatewaySelector, NamespaceScope};
use crate::crd::{AuthGateway, AuthUser};
use crate::observability;
use kube::ResourceExt;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one sync pass
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Gateways that selected the user and were regenerated
    pub matched: Vec<ObjectRef<AuthGateway>>,
    /// Gateways skipped because their selectors are malformed
    pub skipped_invalid: Vec<ObjectRef<AuthGateway>>,
}

/// Serializes gateway regeneration across all reconciliations
#[derive(Clone)]
pub struct GatewaySyncCoordinator {
    lock: Arc<Mutex<()>>,
    store: Arc<dyn ClusterStore>,
    renderer: Arc<dyn GatewayRenderer>,
}

fn sort_key<K: ResourceExt>(obj: &K) -> (String, String) {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Users and namespaces read once per pass, on first need
struct PassSnapshot {
    namespaces: Option<NamespaceIndex>,
    users: Option<Vec<AuthUser>>,
}

impl PassSnapshot {
    async fn load_namespaces(
        &mut self,
        store: &dyn ClusterStore,
        cancel: &CancellationSignal,
    ) -> Result<(), ReconcilerError> {
        if self.namespaces.is_none() {
            self.namespaces = Some(cancel.guard(store.list_namespaces()).await?);
        }
        Ok(())
    }

    async fn load_users(
        &mut self,
        store: &dyn ClusterStore,
        cancel: &CancellationSignal,
    ) -> Result<(), ReconcilerError> {
        if self.users.is_none() {
            let mut users = cancel.guard(store.list_users()).await?;
            users.sort_by_key(sort_key);
            self.users = Some(users);
        }
        Ok(())
    }
}

impl GatewaySyncCoordinator {
    pub fn new(store: Arc<dyn ClusterStore>, renderer: Arc<dyn GatewayRenderer>) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            store,
            renderer,
        }
    }

    /// Regenerate every gateway that selects `user`
    ///
    /// Stops at the first regeneration failure; later gateways are left for the retry.
    pub async fn sync_for_user(
        &self,
        user: &AuthUser,
        cancel: &CancellationSignal,
    ) -> Result<SyncReport, ReconcilerError> {
        let wait_started = Instant::now();
        let _guard = cancel.run(self.lock.lock()).await?;
        observability::metrics::observe_sync_lock_wait(wait_started.elapsed().as_secs_f64());

        let pass_started = Instant::now();
        let result = self.run_pass(user, cancel).await;
        observability::metrics::observe_sync_pass_duration(pass_started.elapsed().as_secs_f64());
        if result.is_ok() {
            observability::metrics::increment_sync_passes();
        }
        result
    }

    async fn run_pass(
        &self,
        user: &AuthUser,
        cancel: &CancellationSignal,
    ) -> Result<SyncReport, ReconcilerError> {
        let store = self.store.as_ref();
        let mut gateways = cancel.guard(store.list_gateways()).await?;
        gateways.sort_by_key(sort_key);

        let mut snapshot = PassSnapshot {
            namespaces: None,
            users: None,
        };
        let mut report = SyncReport::default();
        let empty_index = NamespaceIndex::new();

        for gateway in &gateways {
            let gateway_key =
                object_key(gateway.metadata.namespace.as_deref(), gateway.metadata.name.as_deref());

            let selector = match GatewaySelector::compile(gateway) {
                Ok(selector) => selector,
                Err(e) => {
                    warn!(
                        gateway = gateway_key.as_str(),
                        error = %e,
                        "Skipping gateway with malformed selector"
                    );
                    observability::metrics::increment_selector_errors();
                    report.skipped_invalid.push(ObjectRef::from_obj(gateway));
                    continue;
                }
            };

            if matches!(selector.namespaces, NamespaceScope::Labels(_)) {
                snapshot.load_namespaces(store, cancel).await?;
            }
            let namespaces = snapshot.namespaces.as_ref().unwrap_or(&empty_index);
            if !selector.accepts_user(user, namespaces) {
                debug!(gateway = gateway_key.as_str(), "Gateway does not select user");
                continue;
            }

            snapshot.load_users(store, cancel).await?;
            let namespaces = snapshot.namespaces.as_ref().unwrap_or(&empty_index);
            let matched: Vec<AuthUser> = snapshot
                .users
                .iter()
                .flatten()
                // Unmarked users could leave the store without a cleanup pass
                .filter(|u| has_marker(u) && !is_deleting(u) && !u.spec.disabled)
                .filter(|u| selector.accepts_user(u, namespaces))
                .cloned()
                .collect();

            cancel
                .run(self.renderer.regenerate_gateway(gateway, &matched))
                .await?
                .map_err(|source| ReconcilerError::Regeneration {
                    gateway: gateway_key.clone(),
                    source,
                })?;
            observability::metrics::increment_gateway_regenerations();

            info!(
                gateway = gateway_key.as_str(),
                users = matched.len(),
                "Gateway regenerated"
            );
            report.matched.push(ObjectRef::from_obj(gateway));
        }

        Ok(report)
    }
}
