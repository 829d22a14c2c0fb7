//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
};
use tower::Layer;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::GatewayError;
use crate::authorizer::EdgeAuthorizer;
use crate::config::{ConfigError, GatewayConfig, wildcard_origin};
use crate::middleware::authorize;
use crate::proxy::{UpstreamProxy, proxy_handler};

/// Gateway server.
pub struct Gateway {
    config: GatewayConfig,
    authorizer: Arc<EdgeAuthorizer>,
    proxy: Arc<UpstreamProxy>,
}

impl Gateway {
    /// Create a gateway from validated config.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid. There is no fallback secret.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let authorizer = EdgeAuthorizer::new(config.exemption_set()?, config.token_codec()?)
            .with_strip_spoofed_identity(config.strip_spoofed_identity);
        let proxy = UpstreamProxy::new(
            &config.routes,
            config.upstream_timeout(),
            config.max_body_bytes,
        )?;

        Ok(Self {
            config,
            authorizer: Arc::new(authorizer),
            proxy: Arc::new(proxy),
        })
    }

    /// The authorizer.
    #[must_use]
    pub fn authorizer(&self) -> Arc<EdgeAuthorizer> {
        Arc::clone(&self.authorizer)
    }

    /// Build the application.
    ///
    /// Authorization wraps the whole router, so it runs before route
    /// selection and an unknown protected path still answers 401.
    ///
    /// # Errors
    ///
    /// Returns error if a CORS origin is not a valid header value.
    pub fn app(&self) -> Result<Router, GatewayError> {
        let routes = Router::new()
            .route("/health", get(health_handler))
            .fallback(proxy_handler)
            .with_state(Arc::clone(&self.proxy));

        let authorized = from_fn_with_state(Arc::clone(&self.authorizer), authorize).layer(routes);

        let mut app = Router::new().fallback_service(authorized);
        if let Some(cors) = cors_layer(&self.config.cors_allowed_origins)? {
            app = app.layer(cors);
        }

        Ok(app.layer(TraceLayer::new_for_http()))
    }

    /// Run the gateway server.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let app = self.app()?;

        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| GatewayError::Server(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            public_paths = self.authorizer.exemptions().len(),
            routes = self.proxy.routes().len(),
            "Gateway listening on http://{}",
            addr
        );
        for route in self.proxy.routes() {
            tracing::debug!(pattern = %route.pattern(), upstream = %route.upstream(), "Route");
        }

        axum::serve(listener, app).await?;

        Ok(())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("port", &self.config.port)
            .field("bind_address", &self.config.bind_address)
            .field("routes", &self.proxy.routes().len())
            .finish_non_exhaustive()
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

fn cors_layer(origins: &[String]) -> Result<Option<CorsLayer>, ConfigError> {
    if origins.is_empty() {
        return Ok(None);
    }

    let origins = origins
        .iter()
        .map(|o| {
            if o.trim() == "*" {
                return Err(wildcard_origin());
            }
            HeaderValue::from_str(o).map_err(|e| ConfigError::Invalid {
                field: "corsAllowedOrigins",
                reason: format!("{o}: {e}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
                Method::HEAD,
            ])
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    const SECRET: &str = "gateway-server-test-secret-0123456789";

    fn gateway() -> Gateway {
        let config = GatewayConfig::builder()
            .jwt_secret(SECRET)
            .routes(vec![crate::RouteConfig::new("/api/**", "http://127.0.0.1:9")])
            .build();
        Gateway::new(config).unwrap()
    }

    #[test]
    fn test_new_requires_secret() {
        assert!(matches!(
            Gateway::new(GatewayConfig::default()),
            Err(GatewayError::Config(ConfigError::MissingSecret))
        ));
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = gateway().app().unwrap();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_protected_path_is_unauthorized() {
        let app = gateway().app().unwrap();
        let response = app
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cors_preflight_skips_authorization() {
        let app = gateway().app().unwrap();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/inquiries")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_cors_disabled() {
        assert!(cors_layer(&[]).unwrap().is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }

    #[test]
    fn test_wildcard_origin_is_a_config_error() {
        assert!(matches!(
            cors_layer(&["*".to_string()]),
            Err(ConfigError::Invalid { field: "corsAllowedOrigins", .. })
        ));

        let config = GatewayConfig::builder()
            .jwt_secret(SECRET)
            .cors_allowed_origins(vec!["*".to_string()])
            .build();
        assert!(matches!(
            Gateway::new(config),
            Err(GatewayError::Config(ConfigError::Invalid { .. }))
        ));
    }
}
