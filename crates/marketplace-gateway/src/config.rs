//! Gateway configuration.

use std::path::Path;
use std::time::Duration;

use marketplace_token::{Algorithm, SigningSecret, TokenCodec, TokenError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exemption::{ExemptionSet, PathPattern};

/// Configuration errors, all fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No signing secret configured.
    #[error("jwtSecret is not configured")]
    MissingSecret,

    /// Secret rejected or algorithm not usable.
    #[error("Invalid signing configuration: {0}")]
    Signing(#[from] TokenError),

    /// Malformed path pattern.
    #[error("Invalid path pattern {0}")]
    InvalidPattern(String),

    /// Upstream URL could not be parsed.
    #[error("Invalid upstream for {pattern}: {reason}")]
    InvalidUpstream {
        /// Route pattern.
        pattern: String,
        /// Parse failure.
        reason: String,
    },

    /// Invalid value.
    #[error("Invalid {field}: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Config file could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Config file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A route table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path pattern, same syntax as the exemption list.
    pub pattern: String,
    /// Upstream base URL (scheme, host, port).
    pub upstream: String,
}

impl RouteConfig {
    /// Create a route.
    #[must_use]
    pub fn new(pattern: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            upstream: upstream.into(),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Shared signing secret, same value and encoding as the issuer's.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// HMAC algorithm.
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,

    /// Clock skew tolerated on expiry, in seconds.
    #[serde(default)]
    pub leeway_secs: u64,

    /// Paths that need no token.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,

    /// Route table, first match wins.
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,

    /// Remove a client-supplied `X-User-Id` from public requests.
    #[serde(default = "default_true")]
    pub strip_spoofed_identity: bool,

    /// Upstream request timeout in seconds.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,

    /// Largest request body forwarded upstream.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Origins allowed by CORS. Empty disables CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_algorithm() -> Algorithm {
    Algorithm::HS256
}

const fn default_true() -> bool {
    true
}

const fn default_upstream_timeout() -> u64 {
    30
}

const fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_public_paths() -> Vec<String> {
    ["/api/auth/**", "/api/products", "/api/products/*", "/health"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new("/api/auth/**", "http://127.0.0.1:8081"),
        RouteConfig::new("/api/products", "http://127.0.0.1:8082"),
        RouteConfig::new("/api/products/**", "http://127.0.0.1:8082"),
        RouteConfig::new("/api/inquiries", "http://127.0.0.1:8083"),
        RouteConfig::new("/api/inquiries/**", "http://127.0.0.1:8083"),
    ]
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            jwt_secret: None,
            algorithm: default_algorithm(),
            leeway_secs: 0,
            public_paths: default_public_paths(),
            routes: default_routes(),
            strip_spoofed_identity: true,
            upstream_timeout_secs: default_upstream_timeout(),
            max_body_bytes: default_max_body_bytes(),
            cors_allowed_origins: default_cors_origins(),
        }
    }
}

impl GatewayConfig {
    /// Create a new gateway config builder.
    #[must_use]
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load config from a JSON5 file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse config from JSON5 text.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON5 for this schema.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides.
    ///
    /// `MARKETPLACE_PUBLIC_PATHS` is a comma-separated pattern list that
    /// replaces the configured one.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("MARKETPLACE_JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }

        if let Ok(paths) = std::env::var("MARKETPLACE_PUBLIC_PATHS") {
            self.public_paths = split_patterns(&paths);
        }

        self
    }

    /// Upstream timeout as Duration.
    #[must_use]
    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Build the token codec from the secret and algorithm.
    ///
    /// # Errors
    ///
    /// Returns error if the secret is missing or weak, or the algorithm is
    /// not HMAC.
    pub fn token_codec(&self) -> Result<TokenCodec, ConfigError> {
        let secret = self.jwt_secret.as_deref().ok_or(ConfigError::MissingSecret)?;
        let secret = SigningSecret::parse(secret)?;

        Ok(TokenCodec::new(&secret, self.algorithm)?.with_leeway(self.leeway_secs))
    }

    /// Build the exemption set.
    ///
    /// # Errors
    ///
    /// Returns error on an invalid pattern.
    pub fn exemption_set(&self) -> Result<ExemptionSet, ConfigError> {
        ExemptionSet::new(&self.public_paths)
    }

    /// Validate everything that can be checked without binding a socket.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.token_codec()?;
        self.exemption_set()?;

        for route in &self.routes {
            PathPattern::parse(&route.pattern)?;
            let url = reqwest::Url::parse(&route.upstream).map_err(|e| {
                ConfigError::InvalidUpstream {
                    pattern: route.pattern.clone(),
                    reason: e.to_string(),
                }
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidUpstream {
                    pattern: route.pattern.clone(),
                    reason: format!("unsupported scheme {}", url.scheme()),
                });
            }
        }

        if self.cors_allowed_origins.iter().any(|o| o.trim() == "*") {
            return Err(wildcard_origin());
        }

        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "upstreamTimeoutSecs",
                reason: "must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Credentialed CORS cannot be combined with a wildcard origin.
pub(crate) fn wildcard_origin() -> ConfigError {
    ConfigError::Invalid {
        field: "corsAllowedOrigins",
        reason: "'*' is not allowed with credentials; list origins explicitly".to_string(),
    }
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Builder for `GatewayConfig`.
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
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

    /// Replace the public path list.
    #[must_use]
    pub fn public_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.public_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the route table.
    #[must_use]
    pub fn routes(mut self, routes: Vec<RouteConfig>) -> Self {
        self.config.routes = routes;
        self
    }

    /// Append a route.
    #[must_use]
    pub fn route(mut self, pattern: impl Into<String>, upstream: impl Into<String>) -> Self {
        self.config.routes.push(RouteConfig::new(pattern, upstream));
        self
    }

    /// Toggle stripping of client-supplied identity headers on public paths.
    #[must_use]
    pub fn strip_spoofed_identity(mut self, strip: bool) -> Self {
        self.config.strip_spoofed_identity = strip;
        self
    }

    /// Set the upstream timeout in seconds.
    #[must_use]
    pub fn upstream_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upstream_timeout_secs = secs;
        self
    }

    /// Set the allowed CORS origins.
    #[must_use]
    pub fn cors_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.config.cors_allowed_origins = origins;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SECRET: &str = "gateway-config-test-secret-0123456789";

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.strip_spoofed_identity);
        assert_eq!(
            config.public_paths,
            vec!["/api/auth/**", "/api/products", "/api/products/*", "/health"]
        );
        assert_eq!(config.routes.len(), 5);
        assert_eq!(config.routes[0].upstream, "http://127.0.0.1:8081");
    }

    #[test]
    fn test_parse_json5_with_defaults() {
        let config = GatewayConfig::parse(
            r#"{
                jwtSecret: "gateway-config-test-secret-0123456789",
                leewaySecs: 5,
                publicPaths: ["/health", "/api/catalog/**"],
                routes: [
                    { pattern: "/api/catalog/**", upstream: "http://catalog:9000" },
                ],
            }"#,
        )
        .unwrap();

        assert_eq!(config.leeway_secs, 5);
        assert_eq!(config.public_paths.len(), 2);
        assert_eq!(config.routes, vec![RouteConfig::new("/api/catalog/**", "http://catalog:9000")]);
        assert_eq!(config.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_secret() {
        assert!(matches!(
            GatewayConfig::default().validate(),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn test_weak_secret() {
        let config = GatewayConfig::builder().jwt_secret("too-short").build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Signing(TokenError::WeakSecret { .. }))
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        let config = GatewayConfig::builder()
            .jwt_secret(SECRET)
            .public_paths(["/api/*/x"])
            .build();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPattern(_))));
    }

    #[test]
    fn test_invalid_upstream() {
        let config = GatewayConfig::builder()
            .jwt_secret(SECRET)
            .routes(vec![RouteConfig::new("/api/**", "not a url")])
            .build();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUpstream { .. })));

        let config = GatewayConfig::builder()
            .jwt_secret(SECRET)
            .routes(vec![RouteConfig::new("/api/**", "ftp://files")])
            .build();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUpstream { .. })));
    }

    #[test]
    fn test_wildcard_cors_origin_rejected() {
        let config = GatewayConfig::builder()
            .jwt_secret(SECRET)
            .cors_allowed_origins(vec!["http://localhost:3000".to_string(), "*".to_string()])
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "corsAllowedOrigins", .. })
        ));
    }

    #[test]
    fn test_split_patterns() {
        assert_eq!(
            split_patterns(" /health, /api/auth/** ,,"),
            vec!["/health".to_string(), "/api/auth/**".to_string()]
        );
    }
}
