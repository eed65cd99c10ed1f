//! # AuthGateway Spec
//!
//! Selectors deciding which `AuthUser` resources a gateway serves.

use crate::crd::TargetRef;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

/// AuthGateway Custom Resource Definition
///
/// Selector semantics:
/// - both selectors unset: every `AuthUser` in the cluster
/// - only `userSelector` set: matching users in the gateway's own namespace
/// - `userNamespaceSelector: {}`: every namespace
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.authgateway.io/v1beta1
/// kind: AuthGateway
/// metadata:
///   name: main
///   namespace: monitoring
/// spec:
///   userNamespaceSelector:
///     matchLabels:
///       auth-gateway: enabled
///   userSelector:
///     matchExpressions:
///       - key: team
///         operator: In
///         values: [observability, platform]
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "AuthGateway",
    group = "operator.authgateway.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::AuthGatewayStatus",
    shortname = "agw",
    printcolumn = r#"{"name":"Users", "type":"integer", "jsonPath":".status.observedUsers"}, {"name":"Rendered", "type":"string", "jsonPath":".status.lastRenderTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthGatewaySpec {
    /// Label selector over `AuthUser` labels
    #[serde(default)]
    pub user_selector: Option<LabelSelector>,
    /// Label selector over Namespace labels
    #[serde(default)]
    pub user_namespace_selector: Option<LabelSelector>,
    /// Name of the Secret holding the rendered configuration
    /// Defaults to `authgateway-<name>-config`
    #[serde(default)]
    pub config_secret: Option<String>,
    /// Route served to requests that carry no credentials
    #[serde(default)]
    pub unauthorized_user_access: Option<TargetRef>,
}

impl AuthGateway {
    /// Name of the rendered configuration Secret
    #[must_use]
    pub fn config_secret_name(&self) -> String {
        self.spec.config_secret.clone().unwrap_or_else(|| {
            format!(
                "authgateway-{}-config",
                self.metadata.name.as_deref().unwrap_or("unknown")
            )
        })
    }
}
