//! Common test utilities for reconciler integration tests
//!
//! `FakeCluster` is an in-memory stand-in for the Kubernetes API. It implements
//! every cluster seam the reconciler consumes, journals each call, supports
//! failure injection, and records how many regenerations overlap.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use auth_gateway_controller::cluster::{
    object_key, ClusterStore, FinalizerOps, GatewayRenderer, NamespaceIndex, StoreError,
};
use auth_gateway_controller::config::ControllerConfig;
use auth_gateway_controller::constants::USER_FINALIZER;
use auth_gateway_controller::controller::reconciler::{CancellationSignal, Reconciler};
use auth_gateway_controller::crd::{
    AuthGateway, AuthGatewaySpec, AuthUser, AuthUserSpec, AuthUserStatus, TargetRef,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Time};
use kube::ResourceExt;
use kube_runtime::reflector::ObjectRef;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call made against the fake, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetUser(String),
    ListUsers,
    ListGateways,
    ListNamespaces,
    PatchStatus(String),
    AddMarker(String),
    RemoveMarker(String),
    DeleteDependents(String),
    Regenerate { gateway: String, users: Vec<String> },
}

impl Call {
    /// Whether the call changes cluster state
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Call::PatchStatus(_)
                | Call::AddMarker(_)
                | Call::RemoveMarker(_)
                | Call::DeleteDependents(_)
        )
    }
}

/// Observable cluster state, comparable across reconciles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub users: BTreeMap<String, AuthUser>,
    pub owned_secrets: BTreeMap<String, Vec<String>>,
    /// Gateway key -> user keys of the last successful render
    pub rendered: BTreeMap<String, Vec<String>>,
}

#[derive(Default)]
struct State {
    users: BTreeMap<String, AuthUser>,
    gateways: BTreeMap<String, AuthGateway>,
    namespaces: NamespaceIndex,
    owned_secrets: BTreeMap<String, Vec<String>>,
    rendered: BTreeMap<String, Vec<String>>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
    journal: Mutex<Vec<Call>>,
    /// User keys carrying the marker, captured at each regeneration
    marked_during_render: Mutex<Vec<Vec<String>>>,
    failing_gateways: Mutex<HashSet<String>>,
    fail_get_user: AtomicBool,
    fail_add_marker: AtomicBool,
    fail_delete_dependents: AtomicBool,
    render_delay: Mutex<Option<Duration>>,
    in_render: AtomicUsize,
    max_concurrent_renders: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_user(&self, user: AuthUser) {
        let key = key_of(&user);
        self.state().users.insert(key, user);
    }

    /// Drop a user outright, as the API server does for an object without finalizers
    pub fn remove_user(&self, key: &str) {
        self.state().users.remove(key);
    }

    pub fn add_gateway(&self, gateway: AuthGateway) {
        let key = key_of(&gateway);
        self.state().gateways.insert(key, gateway);
    }

    pub fn add_namespace(&self, name: &str, labels: &[(&str, &str)]) {
        self.state().namespaces.insert(name, label_map(labels));
    }

    pub fn add_owned_secret(&self, user_key: &str, secret: &str) {
        self.state()
            .owned_secrets
            .entry(user_key.to_string())
            .or_default()
            .push(secret.to_string());
    }

    pub fn fail_regeneration_of(&self, gateway_key: &str) {
        self.failing_gateways
            .lock()
            .unwrap()
            .insert(gateway_key.to_string());
    }

    pub fn fail_get_user(&self, fail: bool) {
        self.fail_get_user.store(fail, Ordering::SeqCst);
    }

    pub fn fail_add_marker(&self, fail: bool) {
        self.fail_add_marker.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_dependents(&self, fail: bool) {
        self.fail_delete_dependents.store(fail, Ordering::SeqCst);
    }

    /// Hold every regeneration open for `delay`
    pub fn set_render_delay(&self, delay: Duration) {
        *self.render_delay.lock().unwrap() = Some(delay);
    }

    pub fn user(&self, key: &str) -> Option<AuthUser> {
        self.state().users.get(key).cloned()
    }

    pub fn journal(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().unwrap().clear();
    }

    /// `(gateway, users)` of every regeneration attempt, failed ones included
    pub fn regenerations(&self) -> Vec<(String, Vec<String>)> {
        self.journal()
            .into_iter()
            .filter_map(|call| match call {
                Call::Regenerate { gateway, users } => Some((gateway, users)),
                _ => None,
            })
            .collect()
    }

    pub fn marked_during_render(&self) -> Vec<Vec<String>> {
        self.marked_during_render.lock().unwrap().clone()
    }

    pub fn max_concurrent_renders(&self) -> usize {
        self.max_concurrent_renders.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state();
        Snapshot {
            users: state.users.clone(),
            owned_secrets: state.owned_secrets.clone(),
            rendered: state.rendered.clone(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.journal.lock().unwrap().push(call);
    }
}

fn injected(operation: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {operation} failure"))
}

#[async_trait]
impl ClusterStore for FakeCluster {
    async fn get_user(&self, user: &ObjectRef<AuthUser>) -> Result<Option<AuthUser>, StoreError> {
        let key = object_key(user.namespace.as_deref(), Some(&user.name));
        self.record(Call::GetUser(key.clone()));
        if self.fail_get_user.load(Ordering::SeqCst) {
            return Err(injected("get_user"));
        }
        Ok(self.state().users.get(&key).cloned())
    }

    async fn list_users(&self) -> Result<Vec<AuthUser>, StoreError> {
        self.record(Call::ListUsers);
        Ok(self.state().users.values().cloned().collect())
    }

    async fn list_gateways(&self) -> Result<Vec<AuthGateway>, StoreError> {
        self.record(Call::ListGateways);
        // Reverse order so callers cannot rely on store ordering
        Ok(self.state().gateways.values().rev().cloned().collect())
    }

    async fn list_namespaces(&self) -> Result<NamespaceIndex, StoreError> {
        self.record(Call::ListNamespaces);
        Ok(self.state().namespaces.clone())
    }

    async fn patch_user_status(
        &self,
        user: &AuthUser,
        status: &AuthUserStatus,
    ) -> Result<(), StoreError> {
        let key = key_of(user);
        self.record(Call::PatchStatus(key.clone()));
        let mut state = self.state();
        let stored = state
            .users
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound {
                kind: "AuthUser",
                key: key.clone(),
            })?;
        stored.status = Some(status.clone());
        Ok(())
    }
}

#[async_trait]
impl FinalizerOps for FakeCluster {
    async fn add_marker(&self, user: &AuthUser) -> Result<(), StoreError> {
        let key = key_of(user);
        self.record(Call::AddMarker(key.clone()));
        if self.fail_add_marker.load(Ordering::SeqCst) {
            return Err(injected("add_marker"));
        }
        let mut state = self.state();
        let stored = state.users.get_mut(&key).ok_or(StoreError::NotFound {
            kind: "AuthUser",
            key,
        })?;
        let finalizers = stored.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == USER_FINALIZER) {
            finalizers.push(USER_FINALIZER.to_string());
        }
        Ok(())
    }

    async fn remove_marker(&self, user: &AuthUser) -> Result<(), StoreError> {
        let key = key_of(user);
        self.record(Call::RemoveMarker(key.clone()));
        let mut state = self.state();
        let Some(stored) = state.users.get_mut(&key) else {
            return Ok(());
        };
        if let Some(finalizers) = stored.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != USER_FINALIZER);
        }
        // The API server drops a deleting object once its last finalizer is gone
        if stored.metadata.deletion_timestamp.is_some() && stored.finalizers().is_empty() {
            state.users.remove(&key);
        }
        Ok(())
    }

    async fn delete_owned_dependents(&self, user: &AuthUser) -> Result<usize, StoreError> {
        let key = key_of(user);
        self.record(Call::DeleteDependents(key.clone()));
        if self.fail_delete_dependents.load(Ordering::SeqCst) {
            return Err(injected("delete_owned_dependents"));
        }
        Ok(self
            .state()
            .owned_secrets
            .remove(&key)
            .map_or(0, |secrets| secrets.len()))
    }
}

#[async_trait]
impl GatewayRenderer for FakeCluster {
    async fn regenerate_gateway(
        &self,
        gateway: &AuthGateway,
        users: &[AuthUser],
    ) -> anyhow::Result<()> {
        let running = self.in_render.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_renders.fetch_max(running, Ordering::SeqCst);

        let gateway_key = key_of(gateway);
        let user_keys: Vec<String> = users.iter().map(key_of).collect();
        self.record(Call::Regenerate {
            gateway: gateway_key.clone(),
            users: user_keys.clone(),
        });
        let marked = self
            .state()
            .users
            .iter()
            .filter(|(_, u)| u.finalizers().iter().any(|f| f == USER_FINALIZER))
            .map(|(k, _)| k.clone())
            .collect();
        self.marked_during_render.lock().unwrap().push(marked);

        let delay = *self.render_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self.failing_gateways.lock().unwrap().contains(&gateway_key);
        if !failed {
            self.state().rendered.insert(gateway_key.clone(), user_keys);
        }
        self.in_render.fetch_sub(1, Ordering::SeqCst);

        if failed {
            anyhow::bail!("injected regeneration failure for {gateway_key}");
        }
        Ok(())
    }
}

pub fn key_of<K: ResourceExt>(obj: &K) -> String {
    object_key(obj.namespace().as_deref(), Some(&obj.name_any()))
}

pub fn label_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn selector(pairs: &[(&str, &str)]) -> LabelSelector {
    LabelSelector {
        match_labels: Some(label_map(pairs)),
        match_expressions: None,
    }
}

pub fn user(namespace: &str, name: &str, labels: &[(&str, &str)]) -> AuthUser {
    let mut user = AuthUser::new(
        name,
        AuthUserSpec {
            password: Some(format!("{name}-password")),
            target_refs: vec![TargetRef {
                urls: vec!["http://backend:8080".to_string()],
                paths: vec!["/.*".to_string()],
            }],
            ..AuthUserSpec::default()
        },
    );
    user.metadata.namespace = Some(namespace.to_string());
    user.metadata.labels = Some(label_map(labels));
    user.metadata.uid = Some(format!("uid-{namespace}-{name}"));
    user
}

/// A user already carrying the cleanup marker
pub fn marked_user(namespace: &str, name: &str, labels: &[(&str, &str)]) -> AuthUser {
    let mut user = user(namespace, name, labels);
    user.metadata.finalizers = Some(vec![USER_FINALIZER.to_string()]);
    user
}

/// A marked user whose deletion has been requested
pub fn deleting_user(namespace: &str, name: &str, labels: &[(&str, &str)]) -> AuthUser {
    let mut user = marked_user(namespace, name, labels);
    let requested: Time = serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z"))
        .expect("valid RFC 3339 timestamp");
    user.metadata.deletion_timestamp = Some(requested);
    user
}

pub fn gateway(
    namespace: &str,
    name: &str,
    user_selector: Option<LabelSelector>,
    namespace_selector: Option<LabelSelector>,
) -> AuthGateway {
    let mut gateway = AuthGateway::new(
        name,
        AuthGatewaySpec {
            user_selector,
            user_namespace_selector: namespace_selector,
            ..AuthGatewaySpec::default()
        },
    );
    gateway.metadata.namespace = Some(namespace.to_string());
    gateway
}

pub fn identity(namespace: &str, name: &str) -> ObjectRef<AuthUser> {
    ObjectRef::new(name).within(namespace)
}

/// Reconciler wired to `cluster` for every seam
pub fn reconciler(cluster: &Arc<FakeCluster>) -> Reconciler {
    reconciler_with_cancel(cluster, CancellationSignal::never())
}

pub fn reconciler_with_cancel(cluster: &Arc<FakeCluster>, cancel: CancellationSignal) -> Reconciler {
    Reconciler::new(
        Arc::clone(cluster) as Arc<dyn ClusterStore>,
        Arc::clone(cluster) as Arc<dyn FinalizerOps>,
        Arc::clone(cluster) as Arc<dyn GatewayRenderer>,
        &ControllerConfig::default(),
        cancel,
    )
}
