//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics, probe server, client, reconciler context
//! - `watch_loop`: kube-runtime controller with restart on stream end
//! - `error_policy`: requeue backoff and watch error reporting

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

use crate::config::{ControllerConfig, ServerConfig};
use anyhow::Result;

/// Initialize the controller and run it until shutdown
pub async fn run(controller_config: ControllerConfig, server_config: ServerConfig) -> Result<()> {
    let init = initialization::initialize(&controller_config, &server_config).await?;

    watch_loop::run_watch_loop(
        init.client,
        init.reconciler,
        init.server_state,
        init.cancel,
        &controller_config,
    )
    .await
}
