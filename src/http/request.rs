//! Request handling and transformation.
//!
//! # Responsibilities
//! - Convert an engine request into a [`CallRequest`]
//! - Enforce the body size limit while buffering
//!
//! # Design Decisions
//! - Bodies are buffered once; the receive pipeline works on `Bytes`
//! - An oversized body is rejected before any pipeline runs

use axum::body::Body;
use axum::http::{Request, StatusCode};

use crate::application::call::CallRequest;

/// Buffer `request` into a call request.
///
/// Returns `413 Payload Too Large` when the body exceeds `limit`.
pub async fn into_call_request(request: Request<Body>, limit: usize) -> Result<CallRequest, StatusCode> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, limit).await.map_err(|err| {
        tracing::debug!(error = %err, "Rejecting request body");
        StatusCode::PAYLOAD_TOO_LARGE
    })?;

    let mut call_request = CallRequest::new(parts.method, parts.uri).body(body);
    call_request.headers = parts.headers;
    Ok(call_request)
}
