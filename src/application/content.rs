//! Subjects of the receive and send pipelines.

use axum::http::StatusCode;
use bytes::Bytes;

/// What the handler asked to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveType {
    Bytes,
    Text,
}

/// Request body as it travels through the receive pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedValue {
    /// Untransformed body bytes.
    Raw(Bytes),
    /// Bytes produced by a transformer.
    Bytes(Bytes),
    /// Decoded text produced by a transformer.
    Text(String),
}

/// Subject of the receive pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub expected: ReceiveType,
    pub value: ReceivedValue,
}

impl ReceiveRequest {
    pub fn new(expected: ReceiveType, body: Bytes) -> Self {
        Self {
            expected,
            value: ReceivedValue::Raw(body),
        }
    }
}

/// Subject of the send pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingContent {
    /// Empty body; status as currently set on the response.
    Empty,
    /// UTF-8 text body.
    Text(String),
    /// Binary body.
    Bytes(Bytes),
    /// Status-only response, e.g. a 404 produced when nothing handled the call.
    Status(StatusCode),
}

impl OutgoingContent {
    /// Default `content-type` for the body, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            OutgoingContent::Text(_) => Some("text/plain; charset=utf-8"),
            OutgoingContent::Bytes(_) => Some("application/octet-stream"),
            OutgoingContent::Empty | OutgoingContent::Status(_) => None,
        }
    }
}

impl From<String> for OutgoingContent {
    fn from(text: String) -> Self {
        OutgoingContent::Text(text)
    }
}

impl From<&str> for OutgoingContent {
    fn from(text: &str) -> Self {
        OutgoingContent::Text(text.to_string())
    }
}

impl From<Bytes> for OutgoingContent {
    fn from(bytes: Bytes) -> Self {
        OutgoingContent::Bytes(bytes)
    }
}

impl From<StatusCode> for OutgoingContent {
    fn from(status: StatusCode) -> Self {
        OutgoingContent::Status(status)
    }
}
