//! phasekit server
//!
//! Runs an [`Application`] behind the Axum engine adapter.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ call pipeline
//!                                     Setup → Monitoring → Plugins → Call → Fallback
//!                                       │         │           │        │
//!                                    CallId  CallLogging StatusPages routing
//!                                                                      │
//!                                                                      ▼
//!                                                            route call pipeline
//!                                                              (route plugins,
//!                                                               handlers)
//!                                                                      │
//!                                               receive pipeline ◀─────┤ receive_text()
//!                                               send pipeline    ◀─────┘ respond()
//!     Client Response                                  │
//!     ◀────────────── http::response ◀─────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use clap::Parser;
use tokio::net::TcpListener;

use phasekit::config::{load_config, PhasekitConfig};
use phasekit::lifecycle::{install_default_plugins, spawn_signal_handler, Shutdown};
use phasekit::observability::{logging, metrics};
use phasekit::routing::RoutingError;
use phasekit::{Application, HttpServer, Routing};

#[derive(Debug, Parser)]
#[command(name = "phasekit", version, about = "Phased interception pipeline server")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("failure requested by client")]
    Requested,
}

/// Demo routes: `/`, `/hello/{name}`, `/echo` and `/fail`.
fn demo_routing() -> Result<Routing, RoutingError> {
    let mut routing = Routing::new();
    let root = routing.root();

    routing.handle(root, Some(Method::GET), |ctx| {
        Box::pin(async move {
            ctx.call().respond("phasekit is running").await?;
            Ok(())
        })
    })?;

    let hello = routing.route(root, "/hello/{name}")?;
    routing.handle(hello, Some(Method::GET), |ctx| {
        Box::pin(async move {
            let call = ctx.call();
            let name = call.parameter("name").unwrap_or_default();
            call.respond(format!("Hello, {name}!")).await?;
            Ok(())
        })
    })?;

    let echo = routing.route(root, "/echo")?;
    routing.handle(echo, Some(Method::POST), |ctx| {
        Box::pin(async move {
            let body = ctx.call().receive_text().await?;
            ctx.call().respond(body).await?;
            Ok(())
        })
    })?;

    // Rendered by the application's StatusPages.
    let fail = routing.route(root, "/fail")?;
    routing.handle(fail, None, |_ctx| {
        Box::pin(async move { Err(DemoError::Requested.into()) })
    })?;

    Ok(routing)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PhasekitConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "phasekit starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        request_timeout_secs = config.server.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut application = Application::new();
    install_default_plugins(&mut application, &config.plugins)?;
    application.install_routing(demo_routing()?)?;

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(Arc::new(application), config.server.clone());
    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
