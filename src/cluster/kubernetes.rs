//! # Kubernetes Cluster Store
//!
//! [`ClusterStore`] and [`FinalizerOps`] backed by the Kubernetes API.
//!
//! Finalizer edits are merge patches carrying the `resourceVersion` the edit was
//! computed from, so a concurrent writer turns into a 409 instead of a lost update.

use super::{
    merge_patch_params, object_key, ClusterStore, FinalizerOps, NamespaceIndex, StoreError,
};
use crate::constants::{CONTROLLER_NAME, LABEL_INSTANCE, LABEL_MANAGED_BY, USER_FINALIZER};
use crate::controller::finalizer::has_marker;
use crate::crd::{AuthGateway, AuthUser, AuthUserStatus};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::api::{Api, DeleteParams, ListParams, Patch};
use kube::{Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use tracing::{debug, info};

/// Kubernetes-backed store and finalizer primitives
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn users_in(&self, namespace: &str) -> Api<AuthUser> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map API status codes onto the store taxonomy
fn classify(error: kube::Error, kind: &'static str, key: String) -> StoreError {
    match error {
        kube::Error::Api(ref response) if response.code == 404 => {
            StoreError::NotFound { kind, key }
        }
        kube::Error::Api(ref response) if response.code == 409 => StoreError::Conflict { key },
        other => StoreError::Api(other),
    }
}

/// Merge patch replacing the finalizer list, guarded by `resourceVersion`
fn finalizers_patch(user: &AuthUser, finalizers: &[String]) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "finalizers": finalizers,
            "resourceVersion": user.metadata.resource_version,
        }
    })
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get_user(&self, user: &ObjectRef<AuthUser>) -> Result<Option<AuthUser>, StoreError> {
        let namespace = user.namespace.as_deref().unwrap_or("default");
        self.users_in(namespace)
            .get_opt(&user.name)
            .await
            .map_err(|e| classify(e, "AuthUser", object_key(Some(namespace), Some(&user.name))))
    }

    async fn list_users(&self) -> Result<Vec<AuthUser>, StoreError> {
        let api: Api<AuthUser> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_gateways(&self) -> Result<Vec<AuthGateway>, StoreError> {
        let api: Api<AuthGateway> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_namespaces(&self) -> Result<NamespaceIndex, StoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = api.list_metadata(&ListParams::default()).await?;
        Ok(namespaces
            .items
            .into_iter()
            .filter_map(|ns| {
                let name = ns.metadata.name?;
                Some((name, ns.metadata.labels.unwrap_or_default()))
            })
            .collect())
    }

    async fn patch_user_status(
        &self,
        user: &AuthUser,
        status: &AuthUserStatus,
    ) -> Result<(), StoreError> {
        let namespace = user.namespace().unwrap_or_else(|| "default".to_string());
        let name = user.name_any();
        let patch = serde_json::json!({ "status": status });

        self.users_in(&namespace)
            .patch_status(&name, &merge_patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| classify(e, "AuthUser", object_key(Some(&namespace), Some(&name))))?;
        Ok(())
    }
}

#[async_trait]
impl FinalizerOps for KubeClusterStore {
    async fn add_marker(&self, user: &AuthUser) -> Result<(), StoreError> {
        if has_marker(user) {
            return Ok(());
        }
        let namespace = user.namespace().unwrap_or_else(|| "default".to_string());
        let name = user.name_any();

        let mut finalizers = user.finalizers().to_vec();
        finalizers.push(USER_FINALIZER.to_string());

        self.users_in(&namespace)
            .patch(
                &name,
                &merge_patch_params(),
                &Patch::Merge(finalizers_patch(user, &finalizers)),
            )
            .await
            .map_err(|e| classify(e, "AuthUser", object_key(Some(&namespace), Some(&name))))?;

        debug!(
            resource.namespace = namespace.as_str(),
            resource.name = name.as_str(),
            "finalizer.added"
        );
        Ok(())
    }

    async fn remove_marker(&self, user: &AuthUser) -> Result<(), StoreError> {
        if !has_marker(user) {
            return Ok(());
        }
        let namespace = user.namespace().unwrap_or_else(|| "default".to_string());
        let name = user.name_any();

        let finalizers: Vec<String> = user
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != USER_FINALIZER)
            .cloned()
            .collect();

        match self
            .users_in(&namespace)
            .patch(
                &name,
                &merge_patch_params(),
                &Patch::Merge(finalizers_patch(user, &finalizers)),
            )
            .await
        {
            Ok(_) => {}
            // Already gone: the marker went with it
            Err(kube::Error::Api(ref response)) if response.code == 404 => {}
            Err(e) => {
                return Err(classify(
                    e,
                    "AuthUser",
                    object_key(Some(&namespace), Some(&name)),
                ))
            }
        }

        debug!(
            resource.namespace = namespace.as_str(),
            resource.name = name.as_str(),
            "finalizer.removed"
        );
        Ok(())
    }

    async fn delete_owned_dependents(&self, user: &AuthUser) -> Result<usize, StoreError> {
        let namespace = user.namespace().unwrap_or_else(|| "default".to_string());
        let name = user.name_any();
        let Some(uid) = user.uid() else {
            return Ok(0);
        };

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let selector = format!("{LABEL_MANAGED_BY}={CONTROLLER_NAME},{LABEL_INSTANCE}={name}");
        let owned = secrets
            .list(&ListParams::default().labels(&selector))
            .await?
            .items
            .into_iter()
            .filter(|secret| secret.owner_references().iter().any(|o| o.uid == uid));

        let mut deleted = 0;
        for secret in owned {
            let secret_name = secret.name_any();
            match secrets.delete(&secret_name, &DeleteParams::default()).await {
                Ok(_) => deleted += 1,
                Err(kube::Error::Api(ref response)) if response.code == 404 => {}
                Err(e) => {
                    return Err(classify(
                        e,
                        "Secret",
                        object_key(Some(&namespace), Some(&secret_name)),
                    ))
                }
            }
        }

        if deleted > 0 {
            info!(
                resource.namespace = namespace.as_str(),
                resource.name = name.as_str(),
                deleted,
                "Deleted owned secrets"
            );
        }
        Ok(deleted)
    }
}
