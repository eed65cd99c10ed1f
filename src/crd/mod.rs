//! # Custom Resource Definitions
//!
//! CRD types for the Auth Gateway Controller.
//!
//! ## Module Structure
//!
//! - `user.rs` - `AuthUser`: credentials and upstream routing for one user
//! - `gateway.rs` - `AuthGateway`: selectors choosing which users a gateway serves
//! - `status.rs` - Status types for both resources

mod gateway;
mod status;
mod user;

pub use gateway::{AuthGateway, AuthGatewaySpec};
pub use status::{AuthGatewayStatus, AuthUserStatus, Condition};
pub use user::{
    user_secret_name, AuthUser, AuthUserSpec, CredentialSource, SecretKeyRef, TargetRef,
};

use kube::CustomResourceExt;

/// Render every CRD served by the controller as a multi-document YAML stream
pub fn crds_yaml() -> Result<String, serde_yaml::Error> {
    let mut out = String::new();
    for crd in [AuthUser::crd(), AuthGateway::crd()] {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(out)
}
