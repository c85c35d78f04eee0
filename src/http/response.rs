//! Response handling and transformation.
//!
//! # Responsibilities
//! - Convert a committed [`CallResponse`] into an engine response
//!
//! # Design Decisions
//! - A committed response without a status is `200 OK`

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;

use crate::application::call::CallResponse;

/// Build the engine response for `response`.
pub fn into_response(response: CallResponse) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = response.status.unwrap_or(StatusCode::OK);
    *out.headers_mut() = response.headers;
    out
}
