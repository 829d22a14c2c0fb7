//! Credential management commands.
//!
//! These open the credential database directly, so the issuer must not be
//! running against the same directory.

use std::path::PathBuf;

use anyhow::Context;
use marketplace_issuer::{CredentialRecord, CredentialStore, IssuerConfig, RegisterRequest, SledStore};

use crate::ui;

/// Non-interactive password source for `users create`.
const PASSWORD_ENV: &str = "MARKETPLACE_USER_PASSWORD";

/// Arguments for user commands.
pub struct UsersArgs {
    /// The action to perform.
    pub action: UsersAction,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// User actions.
pub enum UsersAction {
    /// Create a credential record.
    Create {
        /// Username (token subject).
        username: String,
        /// Email address.
        email: String,
        /// Roles carried in issued tokens.
        roles: Vec<String>,
    },
    /// List credential records.
    List,
}

/// Run a user command.
///
/// # Errors
///
/// Returns error if the operation fails.
pub fn run_users(args: UsersArgs) -> anyhow::Result<()> {
    let data_dir = args
        .data_dir
        .unwrap_or_else(|| IssuerConfig::default().data_dir);

    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!(path = %data_dir.display(), "Opening credential store");
    let store = SledStore::open(&data_dir).context("Failed to open credential store")?;

    match args.action {
        UsersAction::Create {
            username,
            email,
            roles,
        } => {
            let password = read_password(std::env::var(PASSWORD_ENV).ok())?;
            create_user(&store, username, email, password, roles)
        }
        UsersAction::List => list_users(&store),
    }
}

/// The password never comes from argv, where `ps` and shell history see it.
fn read_password(from_env: Option<String>) -> anyhow::Result<String> {
    match from_env.filter(|p| !p.is_empty()) {
        Some(password) => Ok(password),
        None => ui::new_password("Password").context("Failed to read password"),
    }
}

fn create_user(
    store: &SledStore,
    username: String,
    email: String,
    password: String,
    roles: Vec<String>,
) -> anyhow::Result<()> {
    let request = RegisterRequest::new(username, email, password);
    request.validate_fields()?;

    let roles: Vec<String> = roles
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    let record =
        CredentialRecord::with_roles(&request.username, &request.email, &request.password, roles)?;
    store.insert(&record)?;

    ui::success(&format!(
        "Created '{}' with roles [{}]",
        record.username,
        record.roles.join(", ")
    ));

    Ok(())
}

fn list_users(store: &SledStore) -> anyhow::Result<()> {
    let records = store.list()?;

    if records.is_empty() {
        ui::info("No credentials stored.");
        return Ok(());
    }

    ui::info(&format!("Credentials ({}):", records.len()));
    println!();
    println!("{:<20} {:<32} {:<16} {:<20}", "USERNAME", "EMAIL", "ROLES", "CREATED");
    println!("{}", "-".repeat(88));

    for record in records {
        println!(
            "{:<20} {:<32} {:<16} {:<20}",
            record.username,
            record.email,
            record.roles.join(","),
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_duplicate() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        create_user(
            &store,
            "admin".into(),
            "admin@x.com".into(),
            "password123".into(),
            vec!["user".into(), " admin ".into()],
        )
        .unwrap();

        let record = store.find_by_username("admin").unwrap().unwrap();
        assert_eq!(record.roles, vec!["user".to_string(), "admin".to_string()]);

        assert!(
            create_user(
                &store,
                "admin".into(),
                "other@x.com".into(),
                "password123".into(),
                vec![],
            )
            .is_err()
        );
    }

    #[test]
    fn test_password_from_env_skips_prompt() {
        assert_eq!(
            read_password(Some("password123".to_string())).unwrap(),
            "password123"
        );
    }

    #[test]
    fn test_create_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        assert!(create_user(&store, "a".into(), "bad".into(), "short".into(), vec![]).is_err());
        assert_eq!(store.count(), 0);
    }
}
