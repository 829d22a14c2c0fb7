//! Issuer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use marketplace_token::{Algorithm, SigningSecret, TokenCodec};
use serde::{Deserialize, Serialize};

use crate::IssuerError;

/// Default token lifetime in seconds (24 hours).
const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 3600;
/// Default listen port.
const DEFAULT_PORT: u16 = 8081;

/// Issuer configuration.
///
/// The signing secret and algorithm must match the gateway's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Directory holding the credential database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Shared signing secret (`hex:` prefix for hex, otherwise UTF-8 bytes).
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// HMAC algorithm.
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("marketplace")
        .join("issuer")
}

const fn default_algorithm() -> Algorithm {
    Algorithm::HS256
}

const fn default_token_ttl() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            data_dir: default_data_dir(),
            jwt_secret: None,
            algorithm: default_algorithm(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl IssuerConfig {
    /// Create a new issuer config builder.
    #[must_use]
    pub fn builder() -> IssuerConfigBuilder {
        IssuerConfigBuilder::default()
    }

    /// Load config from a JSON5 file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, IssuerError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config from JSON5 text.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON5 for this schema.
    pub fn parse(content: &str) -> Result<Self, IssuerError> {
        json5::from_str(content).map_err(|e| IssuerError::Config(format!("Parse error: {e}")))
    }

    /// Token lifetime as Duration.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Apply environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("MARKETPLACE_JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }

        if let Some(ttl) = std::env::var("MARKETPLACE_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.token_ttl_secs = ttl;
        }

        self
    }

    /// Validate the config and build the token codec.
    ///
    /// There is no fallback secret: a missing or short secret is an error.
    ///
    /// # Errors
    ///
    /// Returns error if the secret is missing, too short, the algorithm is
    /// not HMAC, or the TTL is zero.
    pub fn token_codec(&self) -> Result<TokenCodec, IssuerError> {
        if self.token_ttl_secs == 0 {
            return Err(IssuerError::Config("tokenTtlSecs must be non-zero".to_string()));
        }

        let secret = self
            .jwt_secret
            .as_deref()
            .ok_or_else(|| IssuerError::Config("jwtSecret is not configured".to_string()))?;
        let secret = SigningSecret::parse(secret)
            .map_err(|e| IssuerError::Config(format!("Invalid jwtSecret: {e}")))?;

        TokenCodec::new(&secret, self.algorithm)
            .map_err(|e| IssuerError::Config(format!("Invalid algorithm: {e}")))
    }
}

/// Builder for `IssuerConfig`.
#[derive(Debug, Default)]
pub struct IssuerConfigBuilder {
    config: IssuerConfig,
}

impl IssuerConfigBuilder {
    /// Set the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the bind address.
    #[must_use]
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.bind_address = address.into();
        self
    }

    /// Set the data directory.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Set the signing secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    /// Set the algorithm.
    #[must_use]
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    /// Set the token lifetime in seconds.
    #[must_use]
    pub fn token_ttl_secs(mut self, secs: u64) -> Self {
        self.config.token_ttl_secs = secs;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> IssuerConfig {
        self.config
    }
}
