//! Token claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried in every token.
///
/// `sub` is optional on the wire so a token without a subject decodes and
/// is then rejected with a specific error rather than a generic parse
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username of the credential record).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Role set, carried for downstream authorization decisions.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued at (Unix timestamp).
    #[serde(default)]
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
}

/// A freshly signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Compact encoded token.
    pub token: String,
    /// Expiration instant.
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful verification.
///
/// The subject is guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Verified subject.
    pub subject: String,
    /// Roles as minted by the issuer.
    pub roles: Vec<String>,
    /// Issue instant.
    pub issued_at: DateTime<Utc>,
    /// Expiration instant.
    pub expires_at: DateTime<Utc>,
}
