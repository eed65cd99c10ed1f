//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server startup,
//! Kubernetes client and reconciler context.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::reconciler::{cancellation, CancellationHandle, Reconciler};
use crate::controller::server::{start_server, ServerState};
use crate::crd::{AuthGateway, AuthUser};
use crate::observability;
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Flips the cancellation signal carried by `reconciler`
    pub cancel: CancellationHandle,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
pub async fn initialize(
    controller_config: &ControllerConfig,
    server_config: &ServerConfig,
) -> Result<InitializationResult> {
    // Must precede any client construction
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    observability::logging::init_tracing(
        controller_config.log_format,
        &controller_config.log_level,
        controller_config.log_enable_color,
    )
    .map_err(|e| anyhow!("Failed to initialize tracing: {e}"))?;

    info!("Starting Auth Gateway Controller");
    info!(
        "Build info: timestamp={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_GIT_HASH")
    );
    info!(?controller_config, "Controller configuration loaded");

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::default());

    let server_state_clone = server_state.clone();
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let (cancel, signal) = cancellation();
    let reconciler = Arc::new(Reconciler::from_client(
        client.clone(),
        controller_config,
        signal,
    ));

    log_startup_summary(&client).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        cancel,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log existing users and gateways per namespace
///
/// Also the earliest point a missing CRD shows up; the controller keeps running
/// and the watch retries.
async fn log_startup_summary(client: &Client) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.summary",
        operation = "log_startup_summary"
    );
    let _guard = span.enter();

    let users: Api<AuthUser> = Api::all(client.clone());
    let gateways: Api<AuthGateway> = Api::all(client.clone());

    let users = match users.list(&ListParams::default()).await {
        Ok(list) => list.items,
        Err(e) => {
            warn!(error = %e, "AuthUser CRD is not queryable. Is it installed? (auth-gateway-controller crdgen | kubectl apply -f -)");
            return;
        }
    };
    let gateways = match gateways.list(&ListParams::default()).await {
        Ok(list) => list.items,
        Err(e) => {
            warn!(error = %e, "AuthGateway CRD is not queryable. Is it installed?");
            return;
        }
    };

    let mut per_namespace: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for user in &users {
        per_namespace
            .entry(user.namespace().unwrap_or_default())
            .or_default()
            .0 += 1;
    }
    for gateway in &gateways {
        per_namespace
            .entry(gateway.namespace().unwrap_or_default())
            .or_default()
            .1 += 1;
    }

    info!(
        users = users.len(),
        gateways = gateways.len(),
        namespaces = per_namespace.len(),
        "Startup resource summary"
    );
    for (namespace, (user_count, gateway_count)) in &per_namespace {
        info!(
            namespace = namespace.as_str(),
            users = user_count,
            gateways = gateway_count,
            "Namespace resources"
        );
    }
}
