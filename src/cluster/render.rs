//! # Secret Config Renderer
//!
//! Default [`GatewayRenderer`]: renders the matched users of a gateway into a YAML
//! document and writes it to the gateway's configuration Secret.
//!
//! Every regeneration is a full recompute-and-overwrite through server-side apply.
//! A user whose password Secret or key is missing is left out of the document;
//! any API failure while resolving credentials aborts before the Secret is written.
//! The Secret carries a SHA-256 checksum annotation so the gateway deployment can
//! roll on content changes; the gateway status is only patched when that checksum
//! or the user count moves.

use super::{merge_patch_params, GatewayRenderer};
use crate::constants::{
    ANNOTATION_CONFIG_CHECKSUM, CONFIG_SECRET_KEY, CONTROLLER_NAME, LABEL_COMPONENT,
    LABEL_INSTANCE, LABEL_MANAGED_BY, PASSWORD_SECRET_KEY, USERNAME_SECRET_KEY,
};
use crate::crd::{
    user_secret_name, AuthGateway, AuthGatewayStatus, AuthUser, CredentialSource, SecretKeyRef,
    TargetRef,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Rendered gateway configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayConfig {
    pub users: Vec<UserEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unauthorized_user: Option<RouteTable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEntry {
    /// `namespace/name` of the source `AuthUser`
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    pub url_map: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTable {
    pub url_map: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub src_paths: Vec<String>,
    pub url_prefix: Vec<String>,
}

/// Credential after secret references and generated passwords are resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCredential {
    BearerToken(String),
    Password(String),
    None,
}

/// User ready to be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUser {
    pub namespace: String,
    pub name: String,
    pub username: String,
    pub credential: ResolvedCredential,
    pub target_refs: Vec<TargetRef>,
}

impl ResolvedUser {
    /// Resolve a user whose credential needs no cluster lookup
    #[must_use]
    pub fn inline(user: &AuthUser) -> Option<Self> {
        let credential = match user.spec.credential_source() {
            CredentialSource::BearerToken(token) => ResolvedCredential::BearerToken(token.to_string()),
            CredentialSource::Password(password) => ResolvedCredential::Password(password.to_string()),
            CredentialSource::UsernameOnly => ResolvedCredential::None,
            CredentialSource::PasswordRef(_) | CredentialSource::Generated => return None,
        };
        Some(Self::with_credential(user, credential))
    }

    fn with_credential(user: &AuthUser, credential: ResolvedCredential) -> Self {
        let name = user.name_any();
        Self {
            namespace: user.namespace().unwrap_or_else(|| "default".to_string()),
            username: user.spec.username.clone().unwrap_or_else(|| name.clone()),
            name,
            credential,
            target_refs: user.spec.target_refs.clone(),
        }
    }
}

fn routes(target: &TargetRef) -> Route {
    Route {
        src_paths: target.paths.clone(),
        url_prefix: target.urls.clone(),
    }
}

/// Build the configuration document for `gateway`
///
/// Output order follows `users`; callers pass them sorted so equal inputs render
/// byte-identical documents.
#[must_use]
pub fn render_config(gateway: &AuthGateway, users: &[ResolvedUser]) -> GatewayConfig {
    let users = users
        .iter()
        .map(|user| {
            let (username, password, bearer_token) = match &user.credential {
                ResolvedCredential::BearerToken(token) => (None, None, Some(token.clone())),
                ResolvedCredential::Password(password) => {
                    (Some(user.username.clone()), Some(password.clone()), None)
                }
                ResolvedCredential::None => (Some(user.username.clone()), None, None),
            };
            UserEntry {
                name: format!("{}/{}", user.namespace, user.name),
                username,
                password,
                bearer_token,
                url_map: user.target_refs.iter().map(routes).collect(),
            }
        })
        .collect();

    GatewayConfig {
        users,
        unauthorized_user: gateway
            .spec
            .unauthorized_user_access
            .as_ref()
            .map(|target| RouteTable {
                url_map: vec![routes(target)],
            }),
    }
}

/// Hex-encoded SHA-256 of the rendered document
#[must_use]
pub fn config_checksum(rendered: &str) -> String {
    let digest = Sha256::digest(rendered.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn managed_labels(instance: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), CONTROLLER_NAME.to_string()),
        (LABEL_INSTANCE.to_string(), instance.to_string()),
        (LABEL_COMPONENT.to_string(), component.to_string()),
    ])
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(ByteString(bytes)) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return String::from_utf8(bytes.clone()).ok();
    }
    secret.string_data.as_ref().and_then(|d| d.get(key)).cloned()
}

/// Kubernetes-backed renderer writing `authgateway-<name>-config` Secrets
#[derive(Clone)]
pub struct SecretConfigRenderer {
    client: Client,
}

impl SecretConfigRenderer {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Resolve the credential of `user`
    ///
    /// `Ok(None)` when the referenced Secret or key does not exist. API failures
    /// are errors.
    async fn resolve(&self, user: &AuthUser) -> Result<Option<ResolvedUser>> {
        if let Some(resolved) = ResolvedUser::inline(user) {
            return Ok(Some(resolved));
        }
        let namespace = user.namespace().unwrap_or_else(|| "default".to_string());
        let password = match user.spec.credential_source() {
            CredentialSource::PasswordRef(reference) => {
                self.read_password_ref(&namespace, reference).await?
            }
            _ => self.generated_password(user, &namespace).await?,
        };
        Ok(password.map(|password| {
            ResolvedUser::with_credential(user, ResolvedCredential::Password(password))
        }))
    }

    async fn read_password_ref(
        &self,
        namespace: &str,
        reference: &SecretKeyRef,
    ) -> Result<Option<String>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = secrets
            .get_opt(&reference.name)
            .await
            .with_context(|| format!("Failed to read Secret {namespace}/{}", reference.name))?
        else {
            warn!(
                resource.namespace = namespace,
                secret = reference.name.as_str(),
                "Password secret not found"
            );
            return Ok(None);
        };
        let password = secret_value(&secret, &reference.key);
        if password.is_none() {
            warn!(
                resource.namespace = namespace,
                secret = reference.name.as_str(),
                key = reference.key.as_str(),
                "Password secret has no such key"
            );
        }
        Ok(password)
    }

    /// Read the generated password, creating the owned Secret on first use
    async fn generated_password(&self, user: &AuthUser, namespace: &str) -> Result<Option<String>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let name = user_secret_name(&user.name_any());

        if let Some(existing) = secrets
            .get_opt(&name)
            .await
            .with_context(|| format!("Failed to read Secret {namespace}/{name}"))?
        {
            let password = secret_value(&existing, PASSWORD_SECRET_KEY);
            if password.is_none() {
                warn!(
                    resource.namespace = namespace,
                    secret = name.as_str(),
                    "Generated credentials secret has no password"
                );
            }
            return Ok(password);
        }

        let owner = user
            .controller_owner_ref(&())
            .ok_or_else(|| anyhow!("AuthUser {namespace}/{} has no uid yet", user.name_any()))?;
        let password = uuid::Uuid::new_v4().simple().to_string();
        let username = user
            .spec
            .username
            .clone()
            .unwrap_or_else(|| user.name_any());
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(managed_labels(&user.name_any(), "user-credentials")),
                owner_references: Some(vec![owner]),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([
                (
                    USERNAME_SECRET_KEY.to_string(),
                    ByteString(username.into_bytes()),
                ),
                (
                    PASSWORD_SECRET_KEY.to_string(),
                    ByteString(password.clone().into_bytes()),
                ),
            ])),
            ..Secret::default()
        };

        match secrets.create(&PostParams::default(), &secret).await {
            Ok(_) => {
                info!(
                    resource.namespace = namespace,
                    secret = name.as_str(),
                    "Generated credentials secret"
                );
                Ok(Some(password))
            }
            // Lost a creation race; use whatever the winner stored
            Err(kube::Error::Api(ref response)) if response.code == 409 => {
                let existing = secrets
                    .get(&name)
                    .await
                    .with_context(|| format!("Failed to read Secret {namespace}/{name}"))?;
                Ok(secret_value(&existing, PASSWORD_SECRET_KEY))
            }
            Err(e) => Err(e).with_context(|| format!("Failed to create Secret {namespace}/{name}")),
        }
    }

    async fn apply_config_secret(
        &self,
        gateway: &AuthGateway,
        rendered: String,
        checksum: &str,
    ) -> Result<()> {
        let namespace = gateway.namespace().unwrap_or_else(|| "default".to_string());
        let name = gateway.config_secret_name();
        let owner = gateway
            .controller_owner_ref(&())
            .ok_or_else(|| anyhow!("AuthGateway {namespace}/{} has no uid", gateway.name_any()))?;

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.clone()),
                labels: Some(managed_labels(&gateway.name_any(), "gateway-config")),
                annotations: Some(BTreeMap::from([(
                    ANNOTATION_CONFIG_CHECKSUM.to_string(),
                    checksum.to_string(),
                )])),
                owner_references: Some(vec![owner]),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                CONFIG_SECRET_KEY.to_string(),
                ByteString(rendered.into_bytes()),
            )])),
            ..Secret::default()
        };

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        secrets
            .patch(
                &name,
                &PatchParams::apply(CONTROLLER_NAME).force(),
                &Patch::Apply(&secret),
            )
            .await
            .with_context(|| format!("Failed to apply config Secret {namespace}/{name}"))?;
        Ok(())
    }

    async fn update_gateway_status(
        &self,
        gateway: &AuthGateway,
        checksum: &str,
        user_count: usize,
    ) -> Result<()> {
        let observed_users = i32::try_from(user_count).unwrap_or(i32::MAX);
        let current = gateway.status.as_ref();
        if current.and_then(|s| s.config_checksum.as_deref()) == Some(checksum)
            && current.and_then(|s| s.observed_users) == Some(observed_users)
        {
            debug!(gateway = %gateway.name_any(), "Skipping gateway status update - unchanged");
            return Ok(());
        }

        let status = AuthGatewayStatus {
            observed_users: Some(observed_users),
            config_checksum: Some(checksum.to_string()),
            last_render_time: Some(chrono::Utc::now().to_rfc3339()),
        };
        let namespace = gateway.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<AuthGateway> = Api::namespaced(self.client.clone(), &namespace);
        api.patch_status(
            &gateway.name_any(),
            &merge_patch_params(),
            &Patch::Merge(serde_json::json!({ "status": status })),
        )
        .await
        .with_context(|| {
            format!(
                "Failed to update status of AuthGateway {namespace}/{}",
                gateway.name_any()
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl GatewayRenderer for SecretConfigRenderer {
    async fn regenerate_gateway(&self, gateway: &AuthGateway, users: &[AuthUser]) -> Result<()> {
        let mut resolved = Vec::with_capacity(users.len());
        for user in users {
            let namespace = user.namespace().unwrap_or_else(|| "default".to_string());
            let name = user.name_any();
            let user_resolved = self.resolve(user).await.with_context(|| {
                format!("Failed to resolve credentials of AuthUser {namespace}/{name}")
            })?;
            match user_resolved {
                Some(user) => resolved.push(user),
                None => warn!(
                    gateway = %gateway.name_any(),
                    resource.namespace = namespace.as_str(),
                    resource.name = name.as_str(),
                    "Leaving user out of gateway config - credentials missing"
                ),
            }
        }

        let config = render_config(gateway, &resolved);
        let rendered =
            serde_yaml::to_string(&config).context("Failed to serialize gateway config")?;
        let checksum = config_checksum(&rendered);

        self.apply_config_secret(gateway, rendered, &checksum).await?;
        self.update_gateway_status(gateway, &checksum, resolved.len())
            .await?;

        info!(
            gateway = %gateway.name_any(),
            users = resolved.len(),
            checksum = checksum.as_str(),
            "Gateway config rendered"
        );
        Ok(())
    }
}
