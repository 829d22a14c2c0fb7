//! CLI command implementations.

pub mod gateway;
pub mod issuer;
pub mod secret;
pub mod users;

pub use gateway::run_gateway;
pub use issuer::run_issuer;
pub use secret::run_secret_generate;
pub use users::run_users;

use std::path::PathBuf;

/// Default location of a component's config file, if one exists.
fn default_config_path(component: &str) -> Option<PathBuf> {
    let path = dirs::config_dir()?
        .join("marketplace")
        .join(format!("{component}.json5"));
    path.exists().then_some(path)
}
