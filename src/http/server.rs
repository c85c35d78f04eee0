//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to the application
//! - Wire up middleware (tracing, timeout)
//! - Turn each request into an [`ApplicationCall`] and run the call pipeline
//! - Fall back to 404/500 when the pipeline leaves the call unanswered
//! - Bind server to listener with graceful shutdown, then run plugin
//!   shutdown hooks

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::application::{ApplicationCall, Application, OutgoingContent};
use crate::config::ServerConfig;
use crate::http::request::into_call_request;
use crate::http::response::into_response;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// State injected into the engine handler.
#[derive(Clone)]
pub struct EngineState {
    pub application: Arc<Application>,
    pub max_body_bytes: usize,
}

/// HTTP server running one [`Application`].
pub struct HttpServer {
    application: Arc<Application>,
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a server for an application whose plugins and routing are
    /// already installed.
    pub fn new(application: Arc<Application>, config: ServerConfig) -> Self {
        let state = EngineState {
            application: Arc::clone(&application),
            max_body_bytes: config.max_body_bytes,
        };
        let router = Self::build_router(&config, state);
        Self {
            application,
            router,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: EngineState) -> Router {
        Router::new()
            .fallback(handle_call)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs))),
            )
    }

    /// Router for in-process use, e.g. `tower::ServiceExt::oneshot`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` is triggered, drain in-flight calls,
    /// then run the application's shutdown hooks.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await;

        tracing::info!("HTTP server stopped");
        self.application.shutdown();
        served
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Engine handler: every request becomes one call pipeline execution.
async fn handle_call(State(state): State<EngineState>, request: Request<Body>) -> Response {
    let call_request = match into_call_request(request, state.max_body_bytes).await {
        Ok(call_request) => call_request,
        Err(status) => return status.into_response(),
    };

    let call = state.application.create_call(call_request);
    // Abandoned requests (client gone, timeout) cancel the call.
    let guard = call.cancellation().clone().drop_guard();

    if let Err(err) = state.application.execute(&call).await {
        let kind = if err.is_cancelled() { "cancelled" } else { "interceptor" };
        tracing::error!(call_id = %call.id(), error = %err, kind, "Call pipeline failed");
        metrics::record_call_failure(kind);
        if !call.is_responded() {
            call.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            let _ = call.commit(OutgoingContent::Text("Internal Server Error".to_string()));
        }
    }

    if !call.is_responded() {
        respond_not_found(&call).await;
    }

    let _ = guard.disarm();
    into_response(call.response_snapshot())
}

async fn respond_not_found(call: &ApplicationCall) {
    if let Err(err) = call.respond(OutgoingContent::Status(StatusCode::NOT_FOUND)).await {
        tracing::warn!(call_id = %call.id(), error = %err, "Send pipeline failed for 404");
        if !call.is_responded() {
            call.set_status(StatusCode::NOT_FOUND);
            let _ = call.commit(OutgoingContent::Empty);
        }
    }
}
