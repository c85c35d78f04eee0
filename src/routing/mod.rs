//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Setup:
//!     Routing::route(parent, path) → RouteId
//!     Routing::handle / Routing::install (scoped plugins)
//!     → build(application pipelines)
//!     → RoutingTable (merged pipelines per route, immutable)
//!
//! Per call (application Call phase):
//!     path → RoutingTable::resolve → RouteMatch
//!     → call switches to the route's receive/send pipelines
//!     → fork into the route's call pipeline
//!     → handlers on the Call phase
//! ```
//!
//! # Design Decisions
//! - Exact segment matching with `{name}` parameters, nothing more
//! - Deterministic: literal children before parameter children, first match wins
//! - Plugin lookup walks route → ancestors → application
//! - The nearest install of a plugin on a route's chain is the only one whose
//!   hooks run for that route

pub mod matcher;
pub mod router;

use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::plugin::{PluginError, PluginId};

pub use router::{Parameters, RouteId, RouteMatch, Routing, RoutingTable, MATCHED_ROUTE, ROUTE_PARAMETERS};

/// Errors raised while building routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The route id does not belong to this tree.
    #[error("unknown route {0}")]
    UnknownRoute(RouteId),

    /// A path segment could not be parsed.
    #[error("invalid route path segment `{0}`")]
    InvalidPath(String),

    /// A route installs a plugin that is also installed at application level.
    #[error("plugin `{0}` is installed both on the application and on route {1}")]
    DuplicatePlugin(PluginId, RouteId),

    /// Merging route pipelines failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Installing a scoped plugin failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}
