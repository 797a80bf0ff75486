//! Request identification.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) unless the client sent one
//! - Attach it to the tracing span of the request
//!
//! # Design Decisions
//! - The ID is set on the request only; responses are not touched, so
//!   pass-through responses stay byte-for-byte what the upstream produced

use axum::{body::Body, http::Request};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tracing::Span;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Layer that fills in `x-request-id` when missing.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

/// The request's ID, or `"unknown"` if none was set.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Span for `TraceLayer`, carrying the request ID.
pub fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id(request),
    )
}
