//! # Status
//!
//! Status types for `AuthUser` and `AuthGateway`.

use serde::{Deserialize, Serialize};

/// Status of the AuthUser resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthUserStatus {
    /// Current phase
    /// Values: Ready, Disabled
    #[serde(default)]
    pub phase: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation last handled by the controller
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Number of gateways whose configuration includes this user
    #[serde(default)]
    pub matched_gateways: Option<i32>,
    /// Last successful gateway sync (RFC3339)
    #[serde(default)]
    pub last_sync_time: Option<String>,
}

impl AuthUserStatus {
    /// Equality ignoring timestamps
    ///
    /// Used to skip status writes that would only bump `lastSyncTime`.
    #[must_use]
    pub fn same_observation(&self, other: &Self) -> bool {
        self.phase == other.phase
            && self.observed_generation == other.observed_generation
            && self.matched_gateways == other.matched_gateways
            && self.conditions.len() == other.conditions.len()
            && self
                .conditions
                .iter()
                .zip(&other.conditions)
                .all(|(a, b)| a.same_observation(b))
    }
}

/// Status of the AuthGateway resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthGatewayStatus {
    /// Number of users in the rendered configuration
    #[serde(default)]
    pub observed_users: Option<i32>,
    /// SHA-256 of the rendered configuration
    #[serde(default)]
    pub config_checksum: Option<String>,
    /// Last time the configuration content changed (RFC3339)
    #[serde(default)]
    pub last_render_time: Option<String>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    fn same_observation(&self, other: &Self) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
