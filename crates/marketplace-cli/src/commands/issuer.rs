//! Issuer command - start the identity issuer.

use std::path::PathBuf;

use anyhow::{Context, Result};
use marketplace_issuer::{IssuerConfig, IssuerServer};

use crate::ui;

/// Issuer command arguments.
#[derive(Debug, Clone, Default)]
pub struct IssuerArgs {
    /// Config file.
    pub config: Option<PathBuf>,
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Run the issuer command.
///
/// # Errors
///
/// Returns error if the config is invalid or the server fails.
pub async fn run_issuer(args: IssuerArgs) -> Result<()> {
    let config = resolve_config(&args)?;

    ui::header("Starting Marketplace Issuer");
    ui::kv("Address", &format!("{}:{}", config.bind_address, config.port));
    ui::kv("Data", &config.data_dir.display().to_string());
    ui::kv("Token TTL", &format!("{}s", config.token_ttl_secs));
    println!();

    let server = IssuerServer::new(config).context("Failed to initialise issuer")?;
    server.run().await?;

    Ok(())
}

/// Layer config sources: file, then environment, then flags.
fn resolve_config(args: &IssuerArgs) -> Result<IssuerConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| super::default_config_path("issuer"));

    let mut config = match path {
        Some(path) => IssuerConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => IssuerConfig::default(),
    }
    .with_env_overrides();

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = &args.bind {
        config.bind_address.clone_from(bind);
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir.clone_from(dir);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("issuer.json5");
        std::fs::write(&path, "{ port: 9001, bindAddress: '0.0.0.0' }").unwrap();

        let args = IssuerArgs {
            config: Some(path),
            port: Some(9100),
            bind: None,
            data_dir: Some(dir.path().join("data")),
        };
        let config = resolve_config(&args).unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.data_dir, dir.path().join("data"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let args = IssuerArgs {
            config: Some(PathBuf::from("/nonexistent/issuer.json5")),
            ..IssuerArgs::default()
        };
        assert!(resolve_config(&args).is_err());
    }
}
