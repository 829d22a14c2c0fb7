//! Route table and upstream forwarding.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::GatewayError;
use crate::config::{ConfigError, RouteConfig};
use crate::exemption::PathPattern;

/// Headers that describe a single connection and must not be forwarded.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

/// A resolved route.
#[derive(Debug, Clone)]
pub struct Route {
    pattern: PathPattern,
    upstream: reqwest::Url,
}

impl Route {
    /// Parse a configured route.
    ///
    /// # Errors
    ///
    /// Returns error for a bad pattern or upstream URL.
    pub fn parse(config: &RouteConfig) -> Result<Self, ConfigError> {
        let pattern = PathPattern::parse(&config.pattern)?;
        let upstream =
            reqwest::Url::parse(&config.upstream).map_err(|e| ConfigError::InvalidUpstream {
                pattern: config.pattern.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { pattern, upstream })
    }

    /// The route pattern.
    #[must_use]
    pub const fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// The upstream base URL.
    #[must_use]
    pub const fn upstream(&self) -> &reqwest::Url {
        &self.upstream
    }

    /// Full upstream URL for a request path and query.
    ///
    /// Returns `None` if URL parsing would rewrite the path (dot segments,
    /// backslashes), since the upstream would then serve a different path
    /// than the one that was authorized.
    fn target(&self, path: &str, query: Option<&str>) -> Option<reqwest::Url> {
        let base = self.upstream.as_str().trim_end_matches('/');
        let raw = match query {
            Some(q) => format!("{base}{path}?{q}"),
            None => format!("{base}{path}"),
        };

        let url = reqwest::Url::parse(&raw).ok()?;
        let expected = format!("{}{path}", self.upstream.path().trim_end_matches('/'));

        (url.path() == expected).then_some(url)
    }
}

/// Forwards requests to the first matching upstream.
#[derive(Debug, Clone)]
pub struct UpstreamProxy {
    routes: Vec<Route>,
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl UpstreamProxy {
    /// Create a proxy over a route table.
    ///
    /// # Errors
    ///
    /// Returns error if a route is invalid or the HTTP client cannot be built.
    pub fn new(
        routes: &[RouteConfig],
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, GatewayError> {
        let routes = routes
            .iter()
            .map(Route::parse)
            .collect::<Result<Vec<_>, _>>()?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::Server(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            routes,
            client,
            max_body_bytes,
        })
    }

    /// First route whose pattern matches the path.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.pattern.matches(path))
    }

    /// The configured routes, in order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Forward a request and relay the upstream response.
    pub async fn forward(&self, request: Request) -> Response {
        let path = request.uri().path().to_owned();

        let Some(route) = self.resolve(&path) else {
            tracing::debug!(path = %path, "No route");
            return StatusCode::NOT_FOUND.into_response();
        };

        let Some(target) = route.target(&path, request.uri().query()) else {
            tracing::warn!(path = %path, upstream = %route.upstream, "Path would be rewritten upstream");
            return StatusCode::BAD_REQUEST.into_response();
        };
        let (parts, body) = request.into_parts();

        let body = match to_bytes(body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Request body rejected");
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
        };

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        let upstream = self
            .client
            .request(parts.method.clone(), target)
            .headers(headers)
            .body(body)
            .send()
            .await;

        let upstream = match upstream {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::warn!(method = %parts.method, path = %path, upstream = %route.upstream, "Upstream timed out");
                return StatusCode::GATEWAY_TIMEOUT.into_response();
            }
            Err(e) => {
                tracing::warn!(method = %parts.method, path = %path, upstream = %route.upstream, error = %e, "Upstream unreachable");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);
        response_headers.remove(header::CONTENT_LENGTH);

        let bytes = match upstream.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Upstream response body failed");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        tracing::debug!(method = %parts.method, path = %path, status = status.as_u16(), "Forwarded");

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        response
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Fallback handler forwarding everything to the route table.
pub async fn proxy_handler(State(proxy): State<Arc<UpstreamProxy>>, request: Request) -> Response {
    proxy.forward(request).await
}
