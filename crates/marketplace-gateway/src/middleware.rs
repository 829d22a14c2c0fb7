//! Authorization middleware for axum.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::USER_ID_HEADER;
use crate::authorizer::{AuthRejection, Decision, EdgeAuthorizer};

/// Authorize a request before it reaches routing.
///
/// Public requests continue unchanged (minus any spoofed identity header).
/// Authenticated requests continue with `X-User-Id` set to the verified
/// subject, replacing whatever the client sent. Anything else is answered
/// here and never reaches the inner service.
pub async fn authorize(
    State(authorizer): State<Arc<EdgeAuthorizer>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    match authorizer.authorize(&path, request.headers()) {
        Ok(Decision::Public) => {
            if authorizer.strips_spoofed_identity()
                && request.headers_mut().remove(USER_ID_HEADER).is_some()
            {
                tracing::debug!(path = %path, "Dropped client-supplied identity header");
            }
            next.run(request).await
        }
        Ok(Decision::Authenticated(identity)) => {
            let Ok(value) = HeaderValue::from_str(&identity.subject) else {
                return reject(
                    &path,
                    request.method(),
                    &AuthRejection::TokenMalformed("subject is not a valid header value".into()),
                );
            };

            tracing::debug!(path = %path, subject = %identity.subject, "Request authenticated");
            request.headers_mut().insert(USER_ID_HEADER, value);
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(rejection) => reject(&path, request.method(), &rejection),
    }
}

fn reject(path: &str, method: &Method, rejection: &AuthRejection) -> Response {
    match rejection {
        AuthRejection::Internal(detail) => {
            tracing::error!(%method, path, reason = rejection.reason(), detail = %detail, "Authorization failed");
        }
        _ => {
            tracing::warn!(%method, path, reason = rejection.reason(), "Request rejected: {}", rejection);
        }
    }

    rejection.clone().into_response()
}
