//! # Marketplace Issuer
//!
//! Identity issuer for the marketplace.
//!
//! This crate provides:
//! - Credential records with Argon2id password hashes
//! - A sled-backed credential store with atomic uniqueness on username and email
//! - Login (credential check + token minting) and registration
//! - The `/api/auth` HTTP surface

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod credentials;
mod server;
mod service;
mod store;

pub use config::{IssuerConfig, IssuerConfigBuilder};
pub use credentials::{CredentialRecord, DEFAULT_ROLE, PublicCredential};
pub use server::{IssuerServer, health_handler, login_handler, register_handler};
pub use service::{IdentityIssuer, LoginRequest, LoginResponse, RegisterRequest};
pub use store::{CredentialStore, SledStore};

use thiserror::Error;

/// Field that collided during registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictField {
    /// Username already taken.
    Username,
    /// Email already registered.
    Email,
}

impl std::fmt::Display for ConflictField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Username => write!(f, "Username"),
            Self::Email => write!(f, "Email"),
        }
    }
}

/// Issuer errors.
#[derive(Debug, Error)]
pub enum IssuerError {
    /// Unknown user or wrong password. Intentionally indistinguishable.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Username or email already registered.
    #[error("{0} is already registered")]
    Conflict(ConflictField),

    /// Request failed field validation.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Password hashing or hash parsing failed.
    #[error("Password hashing error: {0}")]
    Hashing(String),

    /// Token minting failed.
    #[error("Token error: {0}")]
    Token(#[from] marketplace_token::TokenError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Unexpected failure (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
