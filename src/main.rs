//! # Auth Gateway Controller
//!
//! A Kubernetes controller that keeps auth gateway configuration in sync with
//! the `AuthUser` resources each `AuthGateway` selects.
//!
//! ## Overview
//!
//! 1. **Watching users** - Reconciles `AuthUser` resources and the Secrets they own
//! 2. **Selector matching** - Evaluates each gateway's user and namespace label selectors
//! 3. **Regeneration** - Renders every matched gateway's config Secret in one serialized pass
//! 4. **Cleanup** - Holds a finalizer on users until their owned Secrets are deleted
//!
//! See the [README.md](../README.md) for deployment instructions.

use anyhow::Result;
use auth_gateway_controller::cli::{Cli, Command};
use auth_gateway_controller::config::{ControllerConfig, ServerConfig};
use auth_gateway_controller::crd::crds_yaml;
use auth_gateway_controller::runtime;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_default() {
        Command::Crdgen => {
            print!("{}", crds_yaml()?);
            Ok(())
        }
        Command::Run(args) => {
            let mut controller_config = ControllerConfig::from_env();
            let mut server_config = ServerConfig::from_env();
            args.apply(&mut controller_config, &mut server_config);

            runtime::run(controller_config, server_config).await
        }
    }
}
