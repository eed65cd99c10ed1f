//! # Watch Loop
//!
//! Runs the kube-runtime `Controller` over `AuthUser` resources. Owned Secrets are
//! watched too, so editing or deleting a generated credential Secret re-triggers
//! its user. The controller is restarted if its stream ends without a shutdown.

use crate::config::ControllerConfig;
use crate::constants::{CONTROLLER_NAME, LABEL_MANAGED_BY};
use crate::controller::reconciler::{reconcile, CancellationHandle, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::AuthUser;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Run the controller until shutdown
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    cancel: CancellationHandle,
    config: &ControllerConfig,
) -> Result<(), anyhow::Error> {
    let watch_namespace = config.watch_namespace.as_deref();
    let users: Api<AuthUser> = scoped_api(&client, watch_namespace);
    let secrets: Api<Secret> = scoped_api(&client, watch_namespace);
    let owned_secrets =
        watcher::Config::default().labels(&format!("{LABEL_MANAGED_BY}={CONTROLLER_NAME}"));

    info!(
        namespace = watch_namespace.unwrap_or("*"),
        concurrency = config.max_concurrent_reconciliations,
        "Starting controller watch loop..."
    );

    let shutdown_state = server_state.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_state.set_ready(false);
        cancel.cancel();
        info!("Marked server as not ready, cancelling in-flight reconciliations");
    });

    loop {
        if reconciler.cancel.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        Controller::new(users.clone(), watcher::Config::default().any_semantic())
            .owns(secrets.clone(), owned_secrets.clone())
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, reconciler.clone())
            .for_each(|event| {
                let _watch_guard = watch_span.enter();
                match event {
                    Ok((obj, action)) => {
                        debug!(resource.name = obj.name.as_str(), action = ?action, "watch.event.reconciled");
                    }
                    // Already reported by the error policy
                    Err(controller::Error::ReconcilerFailed(_, _)) => {}
                    Err(e) => {
                        handle_watch_stream_error(&format!("{e:?}"));
                    }
                }
                futures::future::ready(())
            })
            .await;

        if reconciler.cancel.is_cancelled() || !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
