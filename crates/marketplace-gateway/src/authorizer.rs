//! The authorization decision.

use axum::{
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use marketplace_token::{TokenCodec, TokenError, VerifiedToken, bearer_token};
use thiserror::Error;

use crate::exemption::{ExemptionSet, is_canonical_path};

/// Identity established from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Token subject.
    pub subject: String,
    /// Roles carried by the token. Not enforced at the edge.
    pub roles: Vec<String>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

impl From<VerifiedToken> for VerifiedIdentity {
    fn from(token: VerifiedToken) -> Self {
        Self {
            subject: token.subject,
            roles: token.roles,
            expires_at: token.expires_at,
        }
    }
}

/// Outcome of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Exempt path, no token needed.
    Public,
    /// Protected path with a valid token.
    Authenticated(VerifiedIdentity),
}

/// Why a protected request was refused.
///
/// Token failures render as the same empty 401. A path that cannot be
/// classified safely is a 400 and `Internal` is a 500.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthRejection {
    /// Path with dot segments or encoded separators.
    #[error("Path is not canonical")]
    PathNotCanonical,

    /// No `Authorization: Bearer` credential.
    #[error("Bearer token missing")]
    TokenMissing,

    /// Token could not be parsed.
    #[error("Token malformed: {0}")]
    TokenMalformed(String),

    /// Token past its expiry.
    #[error("Token expired")]
    TokenExpired,

    /// MAC mismatch.
    #[error("Token signature invalid")]
    TokenSignatureInvalid,

    /// Verified token without a usable subject.
    #[error("Token subject missing")]
    TokenSubjectMissing,

    /// Unexpected verification failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthRejection {
    /// HTTP status for this rejection.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PathNotCanonical => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    /// Short machine-readable reason, for logs.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::PathNotCanonical => "path_not_canonical",
            Self::TokenMissing => "token_missing",
            Self::TokenMalformed(_) => "token_malformed",
            Self::TokenExpired => "token_expired",
            Self::TokenSignatureInvalid => "token_signature_invalid",
            Self::TokenSubjectMissing => "token_subject_missing",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<TokenError> for AuthRejection {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::SignatureInvalid => Self::TokenSignatureInvalid,
            TokenError::Expired(_) => Self::TokenExpired,
            TokenError::SubjectMissing => Self::TokenSubjectMissing,
            TokenError::Malformed(detail) => Self::TokenMalformed(detail),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}

/// Classifies requests and verifies tokens on protected paths.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct EdgeAuthorizer {
    exemptions: ExemptionSet,
    codec: TokenCodec,
    strip_spoofed_identity: bool,
}

impl EdgeAuthorizer {
    /// Create an authorizer.
    #[must_use]
    pub const fn new(exemptions: ExemptionSet, codec: TokenCodec) -> Self {
        Self {
            exemptions,
            codec,
            strip_spoofed_identity: true,
        }
    }

    /// Whether a client-supplied `X-User-Id` is removed on public paths.
    #[must_use]
    pub fn with_strip_spoofed_identity(mut self, strip: bool) -> Self {
        self.strip_spoofed_identity = strip;
        self
    }

    /// See `with_strip_spoofed_identity`.
    #[must_use]
    pub const fn strips_spoofed_identity(&self) -> bool {
        self.strip_spoofed_identity
    }

    /// The exemption set.
    #[must_use]
    pub const fn exemptions(&self) -> &ExemptionSet {
        &self.exemptions
    }

    /// Decide whether a request may proceed.
    ///
    /// Paths that are not canonical are refused before classification, on
    /// public and protected routes alike.
    ///
    /// # Errors
    ///
    /// Returns the specific rejection for a protected path without a valid
    /// token.
    pub fn authorize(&self, path: &str, headers: &HeaderMap) -> Result<Decision, AuthRejection> {
        self.authorize_at(path, headers, Utc::now())
    }

    /// Same as `authorize`, with an explicit clock.
    ///
    /// # Errors
    ///
    /// See `authorize`.
    pub fn authorize_at(
        &self,
        path: &str,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<Decision, AuthRejection> {
        if !is_canonical_path(path) {
            return Err(AuthRejection::PathNotCanonical);
        }

        if self.exemptions.is_public(path) {
            return Ok(Decision::Public);
        }

        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or(AuthRejection::TokenMissing)?;

        let verified = self.codec.verify_at(token, now)?;

        Ok(Decision::Authenticated(verified.into()))
    }
}
