//! Phased interception pipeline.
//!
//! # Data Flow
//! ```text
//! setup (single-threaded):
//!     Phase::new → add_phase / insert_phase_before / insert_phase_after
//!     → intercept(phase, handler)
//!     → merge(other) for composed pipelines
//!
//! per call (concurrent):
//!     execute(call, subject)
//!     → flattened interceptors (cached, shared read-only)
//!     → PipelineContext (owned by the call)
//!     → proceed / finish / subject swaps
//!     → final subject or ExecutionError
//! ```
//!
//! # Design Decisions
//! - Phases compare by identity
//! - Interceptors are boxed async closures borrowing the context
//! - Errors propagate through nested `proceed()` calls; recovery is an
//!   interceptor that wraps `proceed()` and inspects the result

pub mod context;
pub mod error;
pub mod phase;
#[allow(clippy::module_inception)]
pub mod pipeline;

pub use context::{interceptor, ContextState, Interceptor, InterceptorResult, PipelineContext};
pub use error::{BoxError, ExecutionError, PipelineError};
pub use phase::Phase;
pub use pipeline::{PhaseRelation, Pipeline};
