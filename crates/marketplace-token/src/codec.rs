//! Token signing and verification.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::claims::{Claims, IssuedToken, VerifiedToken};
use crate::{SigningSecret, TokenError};

/// Pure sign/verify capability parameterised by the shared secret.
///
/// Both the issuer and the gateway build their own codec from the same
/// configured secret; nothing else couples them.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    leeway_secs: u64,
}

impl TokenCodec {
    /// Create a codec for an HMAC algorithm.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::UnsupportedAlgorithm` for non-HMAC algorithms.
    pub fn new(secret: &SigningSecret, algorithm: Algorithm) -> Result<Self, TokenError> {
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(TokenError::UnsupportedAlgorithm(algorithm));
        }

        Ok(Self::with_algorithm(secret, algorithm))
    }

    /// Create an HS256 codec.
    #[must_use]
    pub fn hs256(secret: &SigningSecret) -> Self {
        Self::with_algorithm(secret, Algorithm::HS256)
    }

    fn with_algorithm(secret: &SigningSecret, algorithm: Algorithm) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.expose()),
            decoding_key: DecodingKey::from_secret(secret.expose()),
            algorithm,
            leeway_secs: 0,
        }
    }

    /// Allow this many seconds of clock skew when checking expiry.
    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Algorithm used for signing and accepted on verification.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign a token for `subject` valid for `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns error if the TTL is out of range or encoding fails.
    pub fn sign(
        &self,
        subject: &str,
        roles: &[String],
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        self.sign_at(subject, roles, ttl, Utc::now())
    }

    /// Sign a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns error if the TTL is out of range or encoding fails.
    pub fn sign_at(
        &self,
        subject: &str,
        roles: &[String],
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| TokenError::Encoding(format!("TTL out of range: {e}")))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Encoding("Expiry overflows".to_string()))?;

        let claims = Claims {
            sub: Some(subject.to_string()),
            roles: roles.to_vec(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = self.encode_claims(&claims)?;

        Ok(IssuedToken {
            token,
            // Round to the second actually carried in the token.
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or(expires_at),
        })
    }

    /// Encode arbitrary claims with this codec's key.
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails.
    pub fn encode_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(self.algorithm), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Verify a token against the current time.
    ///
    /// # Errors
    ///
    /// Returns the specific reason the token was rejected.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    ///
    /// Checks run in order: structure, signature, claims decoding, expiry,
    /// subject. A token with a valid signature but past expiry always fails.
    ///
    /// # Errors
    ///
    /// Returns the specific reason the token was rejected.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Malformed("empty token".to_string()));
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation())?;
        let claims = data.claims;

        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| TokenError::Malformed(format!("exp out of range: {}", claims.exp)))?;
        let leeway = i64::try_from(self.leeway_secs).unwrap_or(i64::MAX);
        if now.timestamp() >= claims.exp.saturating_add(leeway) {
            return Err(TokenError::Expired(expires_at));
        }

        let subject = match claims.sub {
            Some(sub) if !sub.trim().is_empty() => sub,
            _ => return Err(TokenError::SubjectMissing),
        };

        Ok(VerifiedToken {
            subject,
            roles: claims.roles,
            issued_at: DateTime::from_timestamp(claims.iat, 0).unwrap_or_default(),
            expires_at,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is checked explicitly against the injected clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);
        validation
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

/// Extract the credential from an `Authorization` header value.
///
/// Expects format: "Bearer <token>". Returns `None` for other schemes or an
/// empty credential.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
