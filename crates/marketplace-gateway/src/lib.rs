//! # Marketplace Gateway
//!
//! Edge gateway for the marketplace.
//!
//! Every inbound request passes through the authorizer before routing:
//! public paths (configured exemption patterns) are forwarded untouched,
//! protected paths need a valid bearer token, and the verified subject is
//! attached as `X-User-Id` for the downstream services.
//!
//! This crate provides:
//! - Path exemption patterns (exact, `/*`, `/**`)
//! - The authorization decision and its axum middleware
//! - A route table forwarding to upstream services
//! - A `TrustedIdentity` extractor for services behind the gateway

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authorizer;
pub mod config;
pub mod exemption;
pub mod identity;
pub mod middleware;
pub mod proxy;
pub mod server;

pub use authorizer::{AuthRejection, Decision, EdgeAuthorizer, VerifiedIdentity};
pub use config::{ConfigError, GatewayConfig, GatewayConfigBuilder, RouteConfig};
pub use exemption::{ExemptionSet, PathPattern, is_canonical_path, pattern_matches};
pub use identity::TrustedIdentity;
pub use proxy::UpstreamProxy;
pub use server::Gateway;

use thiserror::Error;

/// Header carrying the verified subject to downstream services.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
