//! Shared signing secret.

use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};

use crate::TokenError;

/// Minimum signing secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Prefix marking a hex-encoded secret in configuration.
const HEX_PREFIX: &str = "hex:";

/// Symmetric secret shared out-of-band between issuer and gateway.
///
/// The bytes are wrapped with `secrecy::SecretBox` so they are zeroed on
/// drop and never printed.
pub struct SigningSecret(SecretBox<[u8]>);

impl SigningSecret {
    /// Wrap raw secret bytes.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::WeakSecret` if fewer than 32 bytes are given.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, TokenError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret {
                min: MIN_SECRET_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(SecretBox::new(bytes.into_boxed_slice())))
    }

    /// Parse a secret as it appears in configuration.
    ///
    /// Values starting with `hex:` are hex-decoded; anything else is used as
    /// its UTF-8 bytes, so both sides derive identical keys from the same
    /// configured string.
    ///
    /// # Errors
    ///
    /// Returns error if hex decoding fails or the result is too short.
    pub fn parse(value: &str) -> Result<Self, TokenError> {
        match value.strip_prefix(HEX_PREFIX) {
            Some(encoded) => Self::from_hex(encoded),
            None => Self::new(value.as_bytes()),
        }
    }

    /// Decode a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns error if hex decoding fails or the result is too short.
    pub fn from_hex(encoded: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| TokenError::SecretEncoding(format!("Invalid hex secret: {e}")))?;
        Self::new(bytes)
    }

    /// Generate a random 256-bit secret.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(SecretBox::new(bytes.into_boxed_slice()))
    }

    /// Render the secret in the `hex:` configuration form.
    #[must_use]
    pub fn to_config_value(&self) -> String {
        format!("{HEX_PREFIX}{}", hex::encode(self.expose()))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningSecret").field(&"[REDACTED]").finish()
    }
}
