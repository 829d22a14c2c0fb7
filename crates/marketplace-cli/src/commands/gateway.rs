//! Gateway command - start the edge gateway and check its health.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use marketplace_gateway::{Gateway, GatewayConfig};

use crate::ui;

/// Gateway command arguments.
#[derive(Debug, Clone)]
pub struct GatewayArgs {
    /// Subcommand.
    pub action: GatewayAction,
}

/// Gateway actions.
#[derive(Debug, Clone)]
pub enum GatewayAction {
    /// Start the server.
    Run {
        /// Config file.
        config: Option<PathBuf>,
        /// Port override.
        port: Option<u16>,
        /// Bind address override.
        bind: Option<String>,
    },
    /// Probe a running gateway.
    Status {
        /// Port to probe.
        port: u16,
    },
}

/// Run the gateway command.
///
/// # Errors
///
/// Returns error if the config is invalid or the server fails.
pub async fn run_gateway(args: GatewayArgs) -> Result<()> {
    match args.action {
        GatewayAction::Run { config, port, bind } => run_gateway_server(config, port, bind).await,
        GatewayAction::Status { port } => gateway_status(port).await,
    }
}

async fn run_gateway_server(
    config: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
) -> Result<()> {
    let config = resolve_config(config, port, bind)?;

    ui::header("Starting Marketplace Gateway");
    ui::kv("Address", &format!("{}:{}", config.bind_address, config.port));
    ui::kv("Public paths", &config.public_paths.join(", "));
    for route in &config.routes {
        ui::kv("Route", &format!("{} -> {}", route.pattern, route.upstream));
    }
    println!();

    let gateway = Gateway::new(config).context("Failed to initialise gateway")?;
    gateway.run().await?;

    Ok(())
}

/// Layer config sources: file, then environment, then flags.
fn resolve_config(
    path: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
) -> Result<GatewayConfig> {
    let path = path.or_else(|| super::default_config_path("gateway"));

    let mut config = match path {
        Some(path) => GatewayConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => GatewayConfig::default(),
    }
    .with_env_overrides();

    if let Some(port) = port {
        config.port = port;
    }
    if let Some(bind) = bind {
        config.bind_address = bind;
    }

    Ok(config)
}

async fn gateway_status(port: u16) -> Result<()> {
    ui::header("Gateway Status");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    match client
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            ui::success(&format!("Gateway is running on port {port}"));
        }
        Ok(resp) => {
            ui::warning(&format!("Gateway answered {} on port {port}", resp.status()));
        }
        Err(_) => {
            ui::warning(&format!("Gateway is not running on port {port}"));
            ui::info("Start with: marketplace gateway run");
        }
    }

    Ok(())
}
