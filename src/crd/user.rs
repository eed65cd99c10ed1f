//! # AuthUser Spec
//!
//! Credentials and upstream routing for a single gateway user.

use serde::{Deserialize, Serialize};

/// AuthUser Custom Resource Definition
///
/// An `AuthUser` is picked up by every `AuthGateway` whose namespace and label
/// selectors accept it. The controller keeps a finalizer on each live user so the
/// user is removed from all gateway configurations, and its generated credential
/// Secret deleted, before Kubernetes drops the object.
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.authgateway.io/v1beta1
/// kind: AuthUser
/// metadata:
///   name: grafana
///   namespace: monitoring
///   labels:
///     team: observability
/// spec:
///   username: grafana
///   generatePassword: true
///   targetRefs:
///     - urls: ["http://vmselect.monitoring.svc:8481"]
///       paths: ["/select/.*"]
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "AuthUser",
    group = "operator.authgateway.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::AuthUserStatus",
    shortname = "au",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Gateways", "type":"integer", "jsonPath":".status.matchedGateways"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuthUserSpec {
    /// Login name presented to the gateway
    /// Defaults to the resource name
    #[serde(default)]
    pub username: Option<String>,
    /// Inline password
    #[serde(default)]
    pub password: Option<String>,
    /// Password read from a Secret in the user's namespace
    #[serde(default)]
    pub password_ref: Option<SecretKeyRef>,
    /// Bearer token authentication
    /// Mutually exclusive with username/password authentication
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Generate a password when none is given
    /// The generated password is stored in the Secret `authuser-<name>`, owned by this user
    #[serde(default)]
    pub generate_password: bool,
    /// Upstream routing for requests authenticated as this user
    pub target_refs: Vec<TargetRef>,
    /// Keep the user declared but leave it out of rendered gateway configuration
    #[serde(default)]
    pub disabled: bool,
}

/// Reference to a key inside a Secret in the same namespace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

/// Upstream target and the request paths routed to it
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// Upstream URLs, load-balanced by the gateway
    pub urls: Vec<String>,
    /// Path regular expressions routed to `urls`
    /// Empty routes every path
    #[serde(default)]
    pub paths: Vec<String>,
}

impl AuthUserSpec {
    /// How the gateway should authenticate this user
    #[must_use]
    pub fn credential_source(&self) -> CredentialSource<'_> {
        if let Some(token) = self.bearer_token.as_deref() {
            CredentialSource::BearerToken(token)
        } else if let Some(password) = self.password.as_deref() {
            CredentialSource::Password(password)
        } else if let Some(reference) = &self.password_ref {
            CredentialSource::PasswordRef(reference)
        } else if self.generate_password {
            CredentialSource::Generated
        } else {
            CredentialSource::UsernameOnly
        }
    }
}

/// Where a user's credential comes from, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource<'a> {
    BearerToken(&'a str),
    Password(&'a str),
    PasswordRef(&'a SecretKeyRef),
    Generated,
    UsernameOnly,
}

/// Name of the credentials Secret generated for a user
#[must_use]
pub fn user_secret_name(user_name: &str) -> String {
    format!("authuser-{user_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AuthUserSpec {
        AuthUserSpec {
            target_refs: vec![TargetRef {
                urls: vec!["http://backend:8080".to_string()],
                paths: vec![],
            }],
            ..AuthUserSpec::default()
        }
    }

    #[test]
    fn test_bearer_token_takes_precedence() {
        let spec = AuthUserSpec {
            bearer_token: Some("tok".to_string()),
            password: Some("pw".to_string()),
            generate_password: true,
            ..spec()
        };
        assert_eq!(spec.credential_source(), CredentialSource::BearerToken("tok"));
    }

    #[test]
    fn test_inline_password_beats_generation() {
        let spec = AuthUserSpec {
            password: Some("pw".to_string()),
            generate_password: true,
            ..spec()
        };
        assert_eq!(spec.credential_source(), CredentialSource::Password("pw"));
    }

    #[test]
    fn test_generated_and_username_only() {
        let generated = AuthUserSpec {
            generate_password: true,
            ..spec()
        };
        assert_eq!(generated.credential_source(), CredentialSource::Generated);
        assert_eq!(spec().credential_source(), CredentialSource::UsernameOnly);
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: AuthUserSpec = serde_json::from_value(serde_json::json!({
            "username": "grafana",
            "passwordRef": {"name": "creds", "key": "pw"},
            "targetRefs": [{"urls": ["http://a"], "paths": ["/api/.*"]}]
        }))
        .expect("spec should deserialize");
        assert_eq!(spec.username.as_deref(), Some("grafana"));
        assert!(!spec.generate_password);
        assert!(matches!(
            spec.credential_source(),
            CredentialSource::PasswordRef(SecretKeyRef { name, key }) if name == "creds" && key == "pw"
        ));
    }

    #[test]
    fn test_user_secret_name() {
        assert_eq!(user_secret_name("grafana"), "authuser-grafana");
    }
}
