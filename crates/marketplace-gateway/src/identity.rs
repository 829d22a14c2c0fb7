//! Identity extractor for services behind the gateway.
//!
//! Downstream services trust `X-User-Id` only because the gateway is the
//! sole writer of it; they must not be reachable from outside.

use axum::{extract::FromRequestParts, http::StatusCode, http::request::Parts};

use crate::USER_ID_HEADER;

/// Subject attached by the gateway.
///
/// Rejects with an empty 401 when the header is absent or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedIdentity(pub String);

impl TrustedIdentity {
    /// The verified subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for TrustedIdentity
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                tracing::debug!(path = %parts.uri.path(), "Request without gateway identity");
                StatusCode::UNAUTHORIZED
            })?;

        Ok(Self(subject.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn inquiry_service() -> Router {
        Router::new().route(
            "/api/inquiries",
            get(|identity: TrustedIdentity| async move { format!("inquiries of {}", identity.subject()) }),
        )
    }

    async fn call(header: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/api/inquiries");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let response = inquiry_service()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_present() {
        assert_eq!(
            call(Some("alice")).await,
            (StatusCode::OK, "inquiries of alice".to_string())
        );
    }

    #[tokio::test]
    async fn test_absent_or_empty() {
        assert_eq!(call(None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(call(Some("")).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(call(Some("   ")).await.0, StatusCode::UNAUTHORIZED);
    }
}
