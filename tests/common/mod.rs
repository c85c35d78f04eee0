//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::http::{Method, Uri};
use tokio::net::TcpListener;

use phasekit::application::{ApplicationCall, CallRequest};
use phasekit::lifecycle::Shutdown;
use phasekit::pipeline::{interceptor, Interceptor, PipelineContext};
use phasekit::{Application, HttpServer};

/// Ordered record shared between interceptors.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Interceptor that appends `suffix` to a `String` subject.
pub fn append(suffix: &'static str) -> Interceptor<String, ()> {
    interceptor(move |ctx: &mut PipelineContext<String, ()>| {
        Box::pin(async move {
            ctx.subject_mut().push_str(suffix);
            Ok(())
        })
    })
}

/// Interceptor that records `event` and proceeds.
pub fn record<S, C>(log: &EventLog, event: &'static str) -> Interceptor<S, C>
where
    S: Send + 'static,
    C: Clone + Send + Sync + 'static,
{
    let log = log.clone();
    interceptor(move |ctx: &mut PipelineContext<S, C>| {
        let log = log.clone();
        Box::pin(async move {
            log.push(event);
            ctx.proceed().await?;
            Ok(())
        })
    })
}

/// Request for `method` and `path` with an empty body.
pub fn request(method: Method, path: &str) -> CallRequest {
    let uri: Uri = path.parse().unwrap();
    CallRequest::new(method, uri)
}

/// Create a call against `app` and run it to completion.
pub async fn run_call(app: &Application, request: CallRequest) -> ApplicationCall {
    let call = app.create_call(request);
    app.execute(&call).await.unwrap();
    call
}

/// Serve `app` on an ephemeral port.
pub async fn spawn_server(
    app: Application,
) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<std::io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(Arc::new(app), Default::default());
    let signal = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, &signal).await });
    (addr, shutdown, handle)
}
