//! Phased interception pipelines with a plugin system and scoped routing.
//!
//! A [`pipeline::Pipeline`] is an ordered list of phases, each holding
//! interceptors that can wrap, short-circuit or transform the rest of the
//! chain. An [`application::Application`] owns three such pipelines (call,
//! receive, send); plugins install hooks into them and can position
//! themselves before or after other plugins. Routes get their own scopes, so a
//! plugin installed on a route only affects calls dispatched to it.

pub mod application;
pub mod attributes;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod routing;

pub use application::{Application, ApplicationCall, CallRequest, OutgoingContent};
pub use config::PhasekitConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{Phase, Pipeline, PipelineContext};
pub use plugin::{create_plugin, ApplicationPlugin};
pub use routing::Routing;
