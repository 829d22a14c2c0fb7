//! Token errors.

use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use thiserror::Error;

/// Errors from signing, verifying or configuring tokens.
///
/// Verification failures keep their specific kind so callers can log them;
/// callers decide how much of that detail reaches the client.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Signing secret is shorter than the required minimum.
    #[error("Signing secret too short: {actual} bytes, need at least {min}")]
    WeakSecret {
        /// Minimum accepted length.
        min: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// Signing secret could not be decoded.
    #[error("Invalid secret encoding: {0}")]
    SecretEncoding(String),

    /// Algorithm is not an HMAC algorithm.
    #[error("Unsupported algorithm: {0:?} (only HS256, HS384 and HS512 are allowed)")]
    UnsupportedAlgorithm(Algorithm),

    /// Token is structurally invalid or its claims cannot be decoded.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// MAC does not match the token contents.
    #[error("Token signature invalid")]
    SignatureInvalid,

    /// Token expiry has passed.
    #[error("Token expired at {0}")]
    Expired(DateTime<Utc>),

    /// Token carries no subject or an empty one.
    #[error("Token has no subject")]
    SubjectMissing,

    /// Token could not be produced.
    #[error("Token encoding failed: {0}")]
    Encoding(String),

    /// Unexpected failure inside the verifier.
    #[error("Internal token error: {0}")]
    Internal(String),
}

impl TokenError {
    /// Whether this error means the presented credential was rejected, as
    /// opposed to a fault in the system itself.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_) | Self::SignatureInvalid | Self::Expired(_) | Self::SubjectMissing
        )
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::Malformed(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_kinds() {
        assert!(TokenError::SignatureInvalid.is_rejection());
        assert!(TokenError::SubjectMissing.is_rejection());
        assert!(TokenError::Malformed("x".to_string()).is_rejection());
        assert!(TokenError::Expired(Utc::now()).is_rejection());
        assert!(!TokenError::Internal("boom".to_string()).is_rejection());
        assert!(!TokenError::Encoding("boom".to_string()).is_rejection());
    }

    #[test]
    fn test_jwt_error_mapping() {
        let err: TokenError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature)
                .into();
        assert!(matches!(err, TokenError::SignatureInvalid));

        let err: TokenError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidToken).into();
        assert!(matches!(err, TokenError::Malformed(_)));

        let err: TokenError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidKeyFormat)
                .into();
        assert!(matches!(err, TokenError::Internal(_)));

        // Expiry is checked against the caller's clock, never by the library
        let err: TokenError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature)
                .into();
        assert!(matches!(err, TokenError::Internal(_)));
    }
}
