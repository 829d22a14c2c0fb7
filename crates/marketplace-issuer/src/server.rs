//! Issuer HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::config::IssuerConfig;
use crate::credentials::PublicCredential;
use crate::service::{IdentityIssuer, LoginRequest, LoginResponse, RegisterRequest};
use crate::IssuerError;

/// Issuer server.
pub struct IssuerServer {
    config: IssuerConfig,
    issuer: Arc<IdentityIssuer>,
}

impl IssuerServer {
    /// Create a server from config, opening the credential store.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or the store cannot be opened.
    pub fn new(config: IssuerConfig) -> Result<Self, IssuerError> {
        let issuer = IdentityIssuer::from_config(&config)?;
        Ok(Self::with_issuer(config, issuer))
    }

    /// Create a server around an existing issuer.
    #[must_use]
    pub fn with_issuer(config: IssuerConfig, issuer: IdentityIssuer) -> Self {
        Self {
            config,
            issuer: Arc::new(issuer),
        }
    }

    /// Build the router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/auth/login", post(login_handler))
            .route("/api/auth/register", post(register_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.issuer))
    }

    /// Run the server until it fails.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), IssuerError> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| IssuerError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            algorithm = ?self.config.algorithm,
            ttl_secs = self.config.token_ttl_secs,
            "Issuer listening on http://{}",
            addr
        );

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

impl std::fmt::Debug for IssuerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerServer")
            .field("port", &self.config.port)
            .field("bind_address", &self.config.bind_address)
            .finish_non_exhaustive()
    }
}

/// Liveness probe.
pub async fn health_handler() -> &'static str {
    "OK"
}

/// `POST /api/auth/login`.
///
/// # Errors
///
/// Returns 400 for missing fields, 401 for bad credentials.
pub async fn login_handler(
    State(issuer): State<Arc<IdentityIssuer>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, IssuerError> {
    let Json(request) = payload.map_err(body_rejection)?;
    request.validate_present()?;

    let issued = tokio::task::spawn_blocking(move || {
        issuer.login(&request.username, &request.password)
    })
    .await
    .map_err(|e| IssuerError::Internal(format!("Login task failed: {e}")))??;

    Ok(Json(issued.into()))
}

/// `POST /api/auth/register`.
///
/// # Errors
///
/// Returns 400 for invalid fields or an already registered username/email.
pub async fn register_handler(
    State(issuer): State<Arc<IdentityIssuer>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublicCredential>), IssuerError> {
    let Json(request) = payload.map_err(body_rejection)?;

    let created = tokio::task::spawn_blocking(move || issuer.register(&request))
        .await
        .map_err(|e| IssuerError::Internal(format!("Registration task failed: {e}")))??;

    Ok((StatusCode::CREATED, Json(created)))
}

fn body_rejection(rejection: JsonRejection) -> IssuerError {
    IssuerError::Validation(vec![format!("body: {}", rejection.body_text())])
}

/// Error body returned by the issuer.
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: u16,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

impl IntoResponse for IssuerError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Self::InvalidCredentials.to_string(),
                None,
            ),
            Self::Conflict(field) => (
                StatusCode::BAD_REQUEST,
                Self::Conflict(field).to_string(),
                None,
            ),
            Self::Validation(details) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                Some(details),
            ),
            other => {
                tracing::error!(error = %other, "Issuer request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error"),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}
