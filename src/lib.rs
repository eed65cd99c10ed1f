//! Auth Gateway Controller Library
//!
//! Core functionality of the Auth Gateway Controller: CRD types, selector
//! matching, the reconciler and its gateway sync coordinator, and the
//! Kubernetes-backed cluster store.
//!
//! ## Quick Start
//!
//! ```rust
//! use auth_gateway_controller::prelude::*;
//! ```

pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
