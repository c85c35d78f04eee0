//! The per-request call object shared by every pipeline of one request.
//!
//! # Responsibilities
//! - Carry request data, response state and per-call attributes
//! - Run the receive pipeline when a handler reads the body
//! - Run the send pipeline when a handler responds, then commit the result
//!
//! # Design Decisions
//! - Cheap to clone: all state lives behind one `Arc`
//! - Response state sits behind a mutex that is never held across an await
//! - Each call owns a cancellation token; pipeline executions for the call use
//!   it or a child of it

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::content::{OutgoingContent, ReceiveRequest, ReceiveType, ReceivedValue};
use crate::application::pipelines::{ReceivePipeline, SendPipeline};
use crate::attributes::Attributes;
use crate::pipeline::ExecutionError;

/// Errors raised by call operations.
#[derive(Debug, Error)]
pub enum CallError {
    /// A response was already committed for this call.
    #[error("response has already been sent for this call")]
    AlreadyResponded,

    /// The body could not be decoded as UTF-8 text.
    #[error("request body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The receive or send pipeline failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Incoming request data.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CallRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Response state accumulated during the call.
#[derive(Debug, Clone, Default)]
pub struct CallResponse {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub committed: bool,
}

#[derive(Clone)]
pub(crate) struct CallPipelines {
    receive: Arc<ReceivePipeline>,
    send: Arc<SendPipeline>,
}

struct CallInner {
    id: Uuid,
    request: CallRequest,
    response: Mutex<CallResponse>,
    attributes: Attributes,
    cancel: CancellationToken,
    pipelines: Mutex<CallPipelines>,
}

/// Handle to one in-flight request.
#[derive(Clone)]
pub struct ApplicationCall {
    inner: Arc<CallInner>,
}

impl ApplicationCall {
    /// Create a call whose body and response go through the given pipelines.
    pub fn new(request: CallRequest, receive: Arc<ReceivePipeline>, send: Arc<SendPipeline>) -> Self {
        Self {
            inner: Arc::new(CallInner {
                id: Uuid::new_v4(),
                request,
                response: Mutex::new(CallResponse::default()),
                attributes: Attributes::new(),
                cancel: CancellationToken::new(),
                pipelines: Mutex::new(CallPipelines { receive, send }),
            }),
        }
    }

    /// Unique id assigned on creation.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn method(&self) -> &Method {
        &self.inner.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.request.uri
    }

    pub fn path(&self) -> &str {
        self.inner.request.uri.path()
    }

    pub fn request_headers(&self) -> &HeaderMap {
        &self.inner.request.headers
    }

    /// First value of a request header, if it is valid text.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.inner
            .request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Path parameter captured by routing.
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.attributes()
            .get(&crate::routing::ROUTE_PARAMETERS)?
            .get(name)
            .cloned()
    }

    /// Per-call attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.inner.attributes
    }

    /// Token cancelled when the call is abandoned.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    fn response(&self) -> MutexGuard<'_, CallResponse> {
        self.inner
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Status set so far.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.response().status = Some(status);
    }

    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.response().headers.insert(name, value);
    }

    /// Response header value, if set and valid text.
    pub fn response_header(&self, name: &str) -> Option<String> {
        self.response()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// True once a response was committed.
    pub fn is_responded(&self) -> bool {
        self.response().committed
    }

    /// Copy of the response state.
    pub fn response_snapshot(&self) -> CallResponse {
        self.response().clone()
    }

    fn pipelines(&self) -> CallPipelines {
        self.inner
            .pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_pipelines(&self, receive: Arc<ReceivePipeline>, send: Arc<SendPipeline>) {
        *self
            .inner
            .pipelines
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = CallPipelines { receive, send };
    }

    /// Run `content` through the send pipeline and commit the result.
    pub async fn respond(&self, content: impl Into<OutgoingContent>) -> Result<(), CallError> {
        if self.is_responded() {
            return Err(CallError::AlreadyResponded);
        }
        let send = self.pipelines().send;
        let content = send
            .execute_with_cancellation(self.clone(), content.into(), self.inner.cancel.child_token())
            .await?;
        self.commit(content)
    }

    /// Commit `content` without running the send pipeline.
    pub fn commit(&self, content: OutgoingContent) -> Result<(), CallError> {
        let mut response = self.response();
        if response.committed {
            return Err(CallError::AlreadyResponded);
        }
        if let Some(content_type) = content.content_type() {
            response
                .headers
                .entry(header::CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(content_type));
        }
        match content {
            OutgoingContent::Empty => {}
            OutgoingContent::Text(text) => response.body = Bytes::from(text),
            OutgoingContent::Bytes(bytes) => response.body = bytes,
            OutgoingContent::Status(status) => response.status = Some(status),
        }
        response.committed = true;
        tracing::trace!(call_id = %self.inner.id, status = ?response.status, "Response committed");
        Ok(())
    }

    async fn receive(&self, expected: ReceiveType) -> Result<ReceivedValue, CallError> {
        let receive = self.pipelines().receive;
        let request = ReceiveRequest::new(expected, self.inner.request.body.clone());
        let received = receive
            .execute_with_cancellation(self.clone(), request, self.inner.cancel.child_token())
            .await?;
        Ok(received.value)
    }

    /// Read the body through the receive pipeline as bytes.
    pub async fn receive_bytes(&self) -> Result<Bytes, CallError> {
        Ok(match self.receive(ReceiveType::Bytes).await? {
            ReceivedValue::Raw(bytes) | ReceivedValue::Bytes(bytes) => bytes,
            ReceivedValue::Text(text) => Bytes::from(text),
        })
    }

    /// Read the body through the receive pipeline as text.
    pub async fn receive_text(&self) -> Result<String, CallError> {
        match self.receive(ReceiveType::Text).await? {
            ReceivedValue::Raw(bytes) | ReceivedValue::Bytes(bytes) => {
                Ok(String::from_utf8(bytes.to_vec())?)
            }
            ReceivedValue::Text(text) => Ok(text),
        }
    }
}

impl fmt::Debug for ApplicationCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationCall")
            .field("id", &self.inner.id)
            .field("method", &self.inner.request.method)
            .field("uri", &self.inner.request.uri)
            .finish()
    }
}
