//! Request ID middleware.
//!
//! Adopts a well-formed incoming `x-request-id` header or generates a fresh
//! [`RequestId`], stores it in the request extensions for handlers, runs the
//! rest of the stack inside a span carrying it, and echoes it on the response.

use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use mr_core::RequestId;

/// Header name used for the request identifier.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Middleware that generates or adopts a request ID.
pub async fn request_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<RequestId>().ok())
        .unwrap_or_default();

    request.extensions_mut().insert(id);

    let span = tracing::info_span!("request", request_id = %id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(val) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), val);
    }

    response
}
