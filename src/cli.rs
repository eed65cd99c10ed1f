//! # Command Line
//!
//! Entry-point arguments of the `auth-gateway-controller` binary.
//!
//! ```bash
//! # Run the controller (default)
//! auth-gateway-controller
//! auth-gateway-controller run --metrics-port 9090 --log-format text
//!
//! # Print the AuthUser and AuthGateway CRDs
//! auth-gateway-controller crdgen | kubectl apply -f -
//! ```
//!
//! Flags override the environment-derived configuration; anything not given
//! on the command line keeps its `from_env` value.

use crate::config::{ControllerConfig, LogFormat, ServerConfig};
use clap::{Args, Parser, Subcommand};

/// Auth Gateway Controller
#[derive(Debug, Parser)]
#[command(name = "auth-gateway-controller", version, long_about = None)]
#[command(
    about = "Regenerates auth gateway configuration from selector-matched AuthUser resources"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the controller
    Run(RunArgs),
    /// Print the CustomResourceDefinitions as multi-document YAML
    Crdgen,
}

impl Default for Command {
    fn default() -> Self {
        Command::Run(RunArgs::default())
    }
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Port of the metrics and probe server
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Log output format (json or text)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Restrict the AuthUser watch to one namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Maximum concurrent reconciliations
    #[arg(long, env = "MAX_CONCURRENT_RECONCILIATIONS")]
    pub max_concurrent_reconciliations: Option<u16>,
}

impl RunArgs {
    /// Apply command-line overrides on top of environment configuration
    pub fn apply(&self, controller: &mut ControllerConfig, server: &mut ServerConfig) {
        if let Some(port) = self.metrics_port {
            server.metrics_port = port;
        }
        if let Some(format) = self.log_format {
            controller.log_format = format;
        }
        if let Some(namespace) = self.watch_namespace.as_deref() {
            controller.watch_namespace =
                (!namespace.is_empty()).then(|| namespace.to_string());
        }
        if let Some(concurrency) = self.max_concurrent_reconciliations {
            controller.max_concurrent_reconciliations = concurrency.max(1);
        }
    }
}
