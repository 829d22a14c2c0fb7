//! Marketplace CLI - runs the identity issuer or the edge gateway.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "marketplace")]
#[command(about = "Marketplace identity issuer and edge gateway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identity issuer operations
    Issuer {
        #[command(subcommand)]
        action: IssuerCommands,
    },

    /// Edge gateway operations
    Gateway {
        #[command(subcommand)]
        action: GatewayCommands,
    },

    /// Signing secret utilities
    Secret {
        #[command(subcommand)]
        action: SecretCommands,
    },

    /// Credential management (issuer must be stopped)
    Users {
        #[command(subcommand)]
        action: UsersCommands,

        /// Data directory override
        #[arg(long, global = true)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IssuerCommands {
    /// Start the issuer server
    Run {
        /// JSON5 config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Credential database directory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GatewayCommands {
    /// Start the gateway server
    Run {
        /// JSON5 config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Check whether a gateway is answering
    Status {
        /// Port to probe
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Generate a random signing secret for both components
    Generate,
}

#[derive(Subcommand)]
enum UsersCommands {
    /// Create a credential record
    ///
    /// The password is read from MARKETPLACE_USER_PASSWORD, or prompted for.
    Create {
        /// Username (token subject)
        #[arg(long)]
        username: String,

        /// Email address
        #[arg(long)]
        email: String,

        /// Roles, comma separated
        #[arg(long, value_delimiter = ',', default_value = "user")]
        roles: Vec<String>,
    },

    /// List credential records
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match cli.command {
        Commands::Issuer { action } => {
            let args = match action {
                IssuerCommands::Run {
                    config,
                    port,
                    bind,
                    data_dir,
                } => commands::issuer::IssuerArgs {
                    config,
                    port,
                    bind,
                    data_dir,
                },
            };
            commands::run_issuer(args).await?;
        }

        Commands::Gateway { action } => {
            let args = commands::gateway::GatewayArgs {
                action: match action {
                    GatewayCommands::Run { config, port, bind } => {
                        commands::gateway::GatewayAction::Run { config, port, bind }
                    }
                    GatewayCommands::Status { port } => {
                        commands::gateway::GatewayAction::Status { port }
                    }
                },
            };
            commands::run_gateway(args).await?;
        }

        Commands::Secret { action } => match action {
            SecretCommands::Generate => commands::run_secret_generate(),
        },

        Commands::Users { action, data_dir } => {
            let args = commands::users::UsersArgs {
                action: match action {
                    UsersCommands::Create {
                        username,
                        email,
                        roles,
                    } => commands::users::UsersAction::Create {
                        username,
                        email,
                        roles,
                    },
                    UsersCommands::List => commands::users::UsersAction::List,
                },
                data_dir,
            };
            commands::run_users(args)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_users_create_has_no_password_flag() {
        let base = [
            "marketplace",
            "users",
            "create",
            "--username",
            "admin",
            "--email",
            "admin@x.com",
        ];
        assert!(Cli::try_parse_from(base).is_ok());

        let with_password = base.iter().copied().chain(["--password", "hunter22"]);
        assert!(Cli::try_parse_from(with_password).is_err());
    }
}
