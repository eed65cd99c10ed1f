//! # Cluster Collaborators
//!
//! Trait seams between the reconciliation core and the cluster it runs against.
//!
//! - [`ClusterStore`]: reads users, gateways and namespaces; writes user status
//! - [`FinalizerOps`]: finalizer marker and owned-dependent bookkeeping
//! - [`GatewayRenderer`]: turns a gateway plus its matched users into configuration
//!
//! `kubernetes` and `render` hold the Kubernetes-backed implementations.

pub mod kubernetes;
pub mod render;

pub use kubernetes::KubeClusterStore;
pub use render::SecretConfigRenderer;

use crate::constants::CONTROLLER_NAME;
use crate::crd::{AuthGateway, AuthUser, AuthUserStatus};
use async_trait::async_trait;
use kube::api::PatchParams;
use kube_runtime::reflector::ObjectRef;
use std::collections::BTreeMap;

static NO_LABELS: BTreeMap<String, String> = BTreeMap::new();

/// Errors surfaced by store and finalizer operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("conflicting write to {key}, object changed since it was read")]
    Conflict { key: String },

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
            || matches!(self, StoreError::Api(kube::Error::Api(e)) if e.code == 404)
    }
}

/// Read-only snapshot of namespace labels
///
/// Built once per sync pass. A namespace missing from the index has no labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceIndex {
    labels: BTreeMap<String, BTreeMap<String, String>>,
}

impl NamespaceIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: impl Into<String>, labels: BTreeMap<String, String>) {
        self.labels.insert(namespace.into(), labels);
    }

    /// Labels of `namespace`, empty when unknown
    #[must_use]
    pub fn labels(&self, namespace: &str) -> &BTreeMap<String, String> {
        self.labels.get(namespace).unwrap_or(&NO_LABELS)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, BTreeMap<String, String>)> for NamespaceIndex {
    fn from_iter<T: IntoIterator<Item = (N, BTreeMap<String, String>)>>(iter: T) -> Self {
        let mut index = Self::new();
        for (namespace, labels) in iter {
            index.insert(namespace, labels);
        }
        index
    }
}

/// Object store consumed by the reconciler
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a user; `Ok(None)` when it no longer exists
    async fn get_user(&self, user: &ObjectRef<AuthUser>) -> Result<Option<AuthUser>, StoreError>;

    /// Every user in the cluster
    async fn list_users(&self) -> Result<Vec<AuthUser>, StoreError>;

    /// Every gateway in the cluster
    async fn list_gateways(&self) -> Result<Vec<AuthGateway>, StoreError>;

    async fn list_namespaces(&self) -> Result<NamespaceIndex, StoreError>;

    async fn patch_user_status(
        &self,
        user: &AuthUser,
        status: &AuthUserStatus,
    ) -> Result<(), StoreError>;
}

/// Finalizer bookkeeping primitives
///
/// Every operation is a no-op when the target state already holds.
#[async_trait]
pub trait FinalizerOps: Send + Sync {
    async fn add_marker(&self, user: &AuthUser) -> Result<(), StoreError>;

    async fn remove_marker(&self, user: &AuthUser) -> Result<(), StoreError>;

    /// Delete resources owned by `user`, returning how many were deleted
    async fn delete_owned_dependents(&self, user: &AuthUser) -> Result<usize, StoreError>;
}

/// Gateway configuration generator
#[async_trait]
pub trait GatewayRenderer: Send + Sync {
    /// Recompute and overwrite the configuration of `gateway` from `users`
    ///
    /// `users` is the complete matched set, sorted by namespace and name.
    async fn regenerate_gateway(&self, gateway: &AuthGateway, users: &[AuthUser])
        -> anyhow::Result<()>;
}

/// `namespace/name` key used in logs and backoff bookkeeping
#[must_use]
pub fn object_key(namespace: Option<&str>, name: Option<&str>) -> String {
    format!(
        "{}/{}",
        namespace.unwrap_or("default"),
        name.unwrap_or("unknown")
    )
}

/// Params for JSON merge patches written by the controller
///
/// Server-side apply goes through `PatchParams::apply` instead.
#[must_use]
pub(crate) fn merge_patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(CONTROLLER_NAME.to_string()),
        ..PatchParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_patch_params_name_the_controller_without_forcing() {
        let params = merge_patch_params();
        assert_eq!(params.field_manager.as_deref(), Some(CONTROLLER_NAME));
        assert!(!params.force);
        assert!(!params.dry_run);
    }

    #[test]
    fn test_namespace_index_unknown_namespace_has_no_labels() {
        let index: NamespaceIndex = [(
            "ns1",
            BTreeMap::from([("team".to_string(), "a".to_string())]),
        )]
        .into_iter()
        .collect();

        assert_eq!(index.labels("ns1").get("team").map(String::as_str), Some("a"));
        assert!(index.labels("missing").is_empty());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_store_error_not_found_classification() {
        let not_found = StoreError::NotFound {
            kind: "AuthUser",
            key: "ns/u".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!StoreError::Conflict {
            key: "ns/u".to_string()
        }
        .is_not_found());
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key(Some("ns1"), Some("u1")), "ns1/u1");
        assert_eq!(object_key(None, None), "default/unknown");
    }
}
