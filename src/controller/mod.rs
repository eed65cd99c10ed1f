//! # Controller
//!
//! Core controller modules for the Auth Gateway Controller.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `finalizer`: cleanup-marker lifecycle of `AuthUser` resources
//! - `reconciler`: reconciliation loop and gateway sync coordination
//! - `selector`: gateway selector compilation and matching
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod finalizer;
pub mod reconciler;
pub mod selector;
pub mod server;
