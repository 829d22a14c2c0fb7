//! Credential records and password hashing.

use std::sync::OnceLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::IssuerError;

/// Role assigned to every self-registered account.
pub const DEFAULT_ROLE: &str = "user";

/// Stored credential record.
///
/// The username doubles as the token subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Unique username.
    pub username: String,
    /// Unique email address.
    pub email: String,
    /// Argon2id PHC string (stored, never exposed in responses).
    pub password_hash: String,
    /// Role set, never empty.
    pub roles: Vec<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Create a record with the default role set, hashing the password.
    ///
    /// # Errors
    ///
    /// Returns error if password hashing fails.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: &str,
    ) -> Result<Self, IssuerError> {
        Self::with_roles(username, email, password, vec![DEFAULT_ROLE.to_string()])
    }

    /// Create a record with an explicit role set.
    ///
    /// An empty role set falls back to the default role.
    ///
    /// # Errors
    ///
    /// Returns error if password hashing fails.
    pub fn with_roles(
        username: impl Into<String>,
        email: impl Into<String>,
        password: &str,
        roles: Vec<String>,
    ) -> Result<Self, IssuerError> {
        let roles = if roles.is_empty() {
            vec![DEFAULT_ROLE.to_string()]
        } else {
            roles
        };

        Ok(Self {
            username: username.into(),
            email: email.into(),
            password_hash: hash_password(password)?,
            roles,
            created_at: Utc::now(),
        })
    }

    /// Verify a password against this record's hash.
    ///
    /// # Errors
    ///
    /// Returns `IssuerError::InvalidCredentials` if the password doesn't match.
    pub fn verify_password(&self, password: &str) -> Result<(), IssuerError> {
        verify_password(password, &self.password_hash)
    }

    /// Create a safe version of the record for API responses (no hash).
    #[must_use]
    pub fn to_public(&self) -> PublicCredential {
        PublicCredential {
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public credential representation (for API responses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCredential {
    /// Username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Role set.
    pub roles: Vec<String>,
    /// When created.
    pub created_at: DateTime<Utc>,
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, IssuerError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| IssuerError::Hashing(e.to_string()))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), IssuerError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| IssuerError::Hashing(format!("Invalid hash: {e}")))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| IssuerError::InvalidCredentials)
}

/// Spend the same Argon2 work as a real verification when the user does not
/// exist, so login timing does not reveal which usernames are registered.
pub(crate) fn burn_verification(password: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    let dummy = DUMMY_HASH.get_or_init(|| hash_password("marketplace-dummy-password").ok());
    if let Some(hash) = dummy {
        let _ = verify_password(password, hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_creation() {
        let record = CredentialRecord::new("alice", "alice@x.com", "password123").unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.roles, vec!["user".to_string()]);
        assert!(record.password_hash.starts_with("$argon2id$"));
        assert!(!record.password_hash.contains("password123"));
    }

    #[test]
    fn test_password_verification() {
        let record = CredentialRecord::new("alice", "alice@x.com", "password123").unwrap();
        assert!(record.verify_password("password123").is_ok());
        assert!(matches!(
            record.verify_password("wrongpassword"),
            Err(IssuerError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_salted_hashes_differ() {
        let a = CredentialRecord::new("a", "a@x.com", "same-password").unwrap();
        let b = CredentialRecord::new("b", "b@x.com", "same-password").unwrap();
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn test_empty_roles_fall_back_to_default() {
        let record = CredentialRecord::with_roles("bob", "bob@x.com", "password123", vec![]).unwrap();
        assert_eq!(record.roles, vec![DEFAULT_ROLE.to_string()]);
    }

    #[test]
    fn test_public_view_has_no_hash() {
        let record = CredentialRecord::with_roles(
            "carol",
            "carol@x.com",
            "password123",
            vec!["user".to_string(), "admin".to_string()],
        )
        .unwrap();
        let public = serde_json::to_value(record.to_public()).unwrap();

        assert_eq!(public["username"], "carol");
        assert_eq!(public["roles"][1], "admin");
        assert!(public.get("password_hash").is_none());
        assert!(!public.to_string().contains("argon2"));
    }

    #[test]
    fn test_corrupt_hash() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(IssuerError::Hashing(_))
        ));
    }
}
