//! # Selector Matcher
//!
//! Decides whether an `AuthGateway` serves an `AuthUser`.
//!
//! Gateway selectors are compiled into tagged variants ([`NamespaceScope`],
//! [`Requirement`]) and evaluated by a small interpreter. Evaluation is pure:
//! namespace labels come from a [`NamespaceIndex`] snapshot taken by the caller.
//!
//! | `userNamespaceSelector` | `userSelector` | users served                         |
//! |-------------------------|----------------|--------------------------------------|
//! | unset                   | unset          | every user in the cluster            |
//! | unset                   | set            | matching users in the gateway's namespace |
//! | `{}`                    | any            | matching users in every namespace    |
//! | non-empty               | any            | matching users in matching namespaces |

use crate::cluster::NamespaceIndex;
use crate::crd::{AuthGateway, AuthUser};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

const MAX_LABEL_NAME_LEN: usize = 63;
const MAX_LABEL_PREFIX_LEN: usize = 253;

static NO_LABELS: BTreeMap<String, String> = BTreeMap::new();

static LABEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?$")
        .expect("label name pattern is valid")
});

static DNS_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("DNS subdomain pattern is valid")
});

/// Malformed gateway selector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("unsupported selector operator '{operator}' for key '{key}'")]
    InvalidOperator { key: String, operator: String },

    #[error("operator {operator} on key '{key}' requires at least one value")]
    MissingValues { key: String, operator: String },

    #[error("operator {operator} on key '{key}' must not have values")]
    UnexpectedValues { key: String, operator: String },

    #[error("invalid label key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("invalid label value '{value}' for key '{key}'")]
    InvalidValue { key: String, value: String },
}

/// One term of a label selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals { key: String, value: String },
    In { key: String, values: BTreeSet<String> },
    NotIn { key: String, values: BTreeSet<String> },
    Exists { key: String },
    DoesNotExist { key: String },
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals { key, value } => labels.get(key) == Some(value),
            Requirement::In { key, values } => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn { key, values } => !labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::Exists { key } => labels.contains_key(key),
            Requirement::DoesNotExist { key } => !labels.contains_key(key),
        }
    }
}

/// Conjunction of requirements; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelPredicate {
    requirements: Vec<Requirement>,
}

impl LabelPredicate {
    /// Predicate accepting every label set
    #[must_use]
    pub fn everything() -> Self {
        Self::default()
    }

    /// Compile a Kubernetes `LabelSelector`
    pub fn compile(selector: &LabelSelector) -> Result<Self, SelectorError> {
        let mut requirements = Vec::new();

        for (key, value) in selector.match_labels.iter().flatten() {
            validate_key(key)?;
            validate_value(key, value)?;
            requirements.push(Requirement::Equals {
                key: key.clone(),
                value: value.clone(),
            });
        }

        for expression in selector.match_expressions.iter().flatten() {
            requirements.push(compile_expression(expression)?);
        }

        Ok(Self { requirements })
    }

    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    #[must_use]
    pub fn is_everything(&self) -> bool {
        self.requirements.is_empty()
    }

    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

fn compile_expression(expression: &LabelSelectorRequirement) -> Result<Requirement, SelectorError> {
    let key = expression.key.clone();
    validate_key(&key)?;
    let values = expression.values.clone().unwrap_or_default();
    let operator = expression.operator.as_str();

    match operator {
        "In" | "NotIn" => {
            if values.is_empty() {
                return Err(SelectorError::MissingValues {
                    key,
                    operator: operator.to_string(),
                });
            }
            for value in &values {
                validate_value(&key, value)?;
            }
            let values: BTreeSet<String> = values.into_iter().collect();
            Ok(if operator == "In" {
                Requirement::In { key, values }
            } else {
                Requirement::NotIn { key, values }
            })
        }
        "Exists" | "DoesNotExist" => {
            if !values.is_empty() {
                return Err(SelectorError::UnexpectedValues {
                    key,
                    operator: operator.to_string(),
                });
            }
            Ok(if operator == "Exists" {
                Requirement::Exists { key }
            } else {
                Requirement::DoesNotExist { key }
            })
        }
        other => Err(SelectorError::InvalidOperator {
            key,
            operator: other.to_string(),
        }),
    }
}

/// Validate a label key: `[prefix/]name`
fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = |reason| SelectorError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > MAX_LABEL_PREFIX_LEN {
                return Err(invalid("prefix must be 1-253 characters"));
            }
            if !DNS_SUBDOMAIN.is_match(prefix) {
                return Err(invalid("prefix must be a DNS subdomain"));
            }
            name
        }
        None => key,
    };

    if name.is_empty() || name.len() > MAX_LABEL_NAME_LEN {
        return Err(invalid("name must be 1-63 characters"));
    }
    if !LABEL_NAME.is_match(name) {
        return Err(invalid(
            "name must be alphanumeric with '-', '_' or '.' between alphanumerics",
        ));
    }
    Ok(())
}

/// Validate a label value; empty is allowed
fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > MAX_LABEL_NAME_LEN || !LABEL_NAME.is_match(value) {
        return Err(SelectorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Which namespaces a gateway draws users from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    Any,
    Same(String),
    Labels(LabelPredicate),
}

impl NamespaceScope {
    #[must_use]
    pub fn accepts(&self, namespace: &str, namespaces: &NamespaceIndex) -> bool {
        match self {
            NamespaceScope::Any => true,
            NamespaceScope::Same(own) => own == namespace,
            NamespaceScope::Labels(predicate) => predicate.matches(namespaces.labels(namespace)),
        }
    }
}

/// Compiled selectors of one gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySelector {
    pub namespaces: NamespaceScope,
    pub labels: LabelPredicate,
}

impl GatewaySelector {
    pub fn compile(gateway: &AuthGateway) -> Result<Self, SelectorError> {
        let own_namespace = gateway
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        let user_selector = gateway.spec.user_selector.as_ref();
        let namespace_selector = gateway.spec.user_namespace_selector.as_ref();

        let namespaces = match (namespace_selector, user_selector) {
            (None, None) => NamespaceScope::Any,
            (None, Some(_)) => NamespaceScope::Same(own_namespace),
            (Some(selector), _) => {
                let predicate = LabelPredicate::compile(selector)?;
                if predicate.is_everything() {
                    NamespaceScope::Any
                } else {
                    NamespaceScope::Labels(predicate)
                }
            }
        };

        let labels = match user_selector {
            Some(selector) => LabelPredicate::compile(selector)?,
            None => LabelPredicate::everything(),
        };

        Ok(Self { namespaces, labels })
    }

    /// Whether a user in `namespace` with `labels` is served
    #[must_use]
    pub fn accepts(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        namespaces: &NamespaceIndex,
    ) -> bool {
        self.namespaces.accepts(namespace, namespaces) && self.labels.matches(labels)
    }

    #[must_use]
    pub fn accepts_user(&self, user: &AuthUser, namespaces: &NamespaceIndex) -> bool {
        let namespace = user.metadata.namespace.as_deref().unwrap_or("default");
        let labels = user.metadata.labels.as_ref().unwrap_or(&NO_LABELS);
        self.accepts(namespace, labels, namespaces)
    }
}

/// Whether `gateway` serves `user`
///
/// Deterministic for fixed inputs. Fails only on a malformed gateway selector.
pub fn matches(
    user: &AuthUser,
    gateway: &AuthGateway,
    namespaces: &NamespaceIndex,
) -> Result<bool, SelectorError> {
    Ok(GatewaySelector::compile(gateway)?.accepts_user(user, namespaces))
}
