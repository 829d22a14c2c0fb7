//! Login and registration.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use marketplace_token::{IssuedToken, TokenCodec};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::IssuerConfig;
use crate::credentials::{CredentialRecord, PublicCredential, burn_verification};
use crate::store::{CredentialStore, SledStore};
use crate::{ConflictField, IssuerError};

/// Login request body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Username.
    #[serde(default)]
    pub username: String,
    /// Plaintext password.
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    /// Check both fields are present.
    ///
    /// # Errors
    ///
    /// Returns `IssuerError::Validation` naming each empty field.
    pub fn validate_present(&self) -> Result<(), IssuerError> {
        let mut details = Vec::new();
        if self.username.trim().is_empty() {
            details.push("username: must not be blank".to_string());
        }
        if self.password.is_empty() {
            details.push("password: must not be blank".to_string());
        }

        if details.is_empty() {
            Ok(())
        } else {
            Err(IssuerError::Validation(details))
        }
    }
}

/// Successful login response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Signed bearer token.
    pub token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for LoginResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            token_type: "Bearer".to_string(),
            expires_at: issued.expires_at,
        }
    }
}

/// Registration request body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Desired username.
    #[serde(default)]
    #[validate(length(min = 3, max = 50, message = "must be between 3 and 50 characters"))]
    pub username: String,

    /// Email address.
    #[serde(default)]
    #[validate(
        email(message = "must be a valid email address"),
        length(max = 100, message = "must be at most 100 characters")
    )]
    pub email: String,

    /// Plaintext password.
    #[serde(default)]
    #[validate(length(min = 8, max = 100, message = "must be between 8 and 100 characters"))]
    pub password: String,
}

impl RegisterRequest {
    /// Create a registration request.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Run field validation, collecting one message per failing field.
    ///
    /// # Errors
    ///
    /// Returns `IssuerError::Validation` listing every failing field.
    pub fn validate_fields(&self) -> Result<(), IssuerError> {
        let mut details = Vec::new();

        if let Err(errors) = self.validate() {
            for (field, field_errors) in errors.field_errors() {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map_or_else(|| error.code.to_string(), ToString::to_string);
                    details.push(format!("{field}: {message}"));
                }
            }
        }

        for (field, value) in [
            ("username", &self.username),
            ("email", &self.email),
            ("password", &self.password),
        ] {
            if !value.is_empty() && value.trim().is_empty() {
                details.push(format!("{field}: must not be blank"));
            }
        }

        if details.is_empty() {
            Ok(())
        } else {
            details.sort();
            details.dedup();
            Err(IssuerError::Validation(details))
        }
    }
}

/// The identity issuer.
///
/// All operations are synchronous and CPU/IO bound; async callers should run
/// them on the blocking pool.
#[derive(Clone)]
pub struct IdentityIssuer {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    ttl: Duration,
}

impl IdentityIssuer {
    /// Create an issuer over a store and codec.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, codec: TokenCodec, ttl: Duration) -> Self {
        Self { store, codec, ttl }
    }

    /// Build an issuer from config, opening the sled store in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or the store cannot be opened.
    pub fn from_config(config: &IssuerConfig) -> Result<Self, IssuerError> {
        let codec = config.token_codec()?;
        std::fs::create_dir_all(&config.data_dir)?;
        let store = SledStore::open(&config.data_dir)?;

        Ok(Self::new(Arc::new(store), codec, config.token_ttl()))
    }

    /// Token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Verify credentials and mint a token.
    ///
    /// # Errors
    ///
    /// Returns `IssuerError::InvalidCredentials` for an unknown user or a
    /// wrong password, or a storage/token error.
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, IssuerError> {
        let Some(record) = self.store.find_by_username(username)? else {
            burn_verification(password);
            tracing::info!(username = %username, reason = "unknown user", "Login rejected");
            return Err(IssuerError::InvalidCredentials);
        };

        if let Err(e) = record.verify_password(password) {
            if matches!(e, IssuerError::InvalidCredentials) {
                tracing::info!(username = %username, reason = "wrong password", "Login rejected");
            }
            return Err(e);
        }

        let issued = self.codec.sign(&record.username, &record.roles, self.ttl)?;
        tracing::info!(username = %record.username, expires_at = %issued.expires_at, "Token issued");

        Ok(issued)
    }

    /// Register a new credential record.
    ///
    /// # Errors
    ///
    /// Returns `IssuerError::Validation` for bad fields,
    /// `IssuerError::Conflict` if the username or email is taken (including
    /// when a concurrent registration wins the insert), or a storage error.
    pub fn register(&self, request: &RegisterRequest) -> Result<PublicCredential, IssuerError> {
        request.validate_fields()?;

        if self.store.username_exists(&request.username)? {
            return Err(IssuerError::Conflict(ConflictField::Username));
        }
        if self.store.email_exists(&request.email)? {
            return Err(IssuerError::Conflict(ConflictField::Email));
        }

        let record = CredentialRecord::new(&request.username, &request.email, &request.password)?;

        match self.store.insert(&record) {
            Ok(()) => {
                tracing::info!(username = %record.username, "Registered credential");
                Ok(record.to_public())
            }
            Err(IssuerError::Conflict(field)) => {
                tracing::debug!(username = %record.username, field = %field, "Lost registration race");
                Err(IssuerError::Conflict(field))
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for IdentityIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityIssuer")
            .field("codec", &self.codec)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
