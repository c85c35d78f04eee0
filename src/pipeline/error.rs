//! Pipeline error definitions.

use thiserror::Error;

use crate::pipeline::phase::Phase;

/// Boxed error returned by interceptors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structural errors raised while building a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A phase used as a reference or interception target is not registered.
    #[error("phase `{0}` was not registered for this pipeline")]
    PhaseNotFound(Phase),

    /// A phase is inserted a second time at another position.
    #[error("phase `{0}` is already registered for this pipeline")]
    DuplicatePhase(Phase),
}

/// Errors surfaced by `execute` and `proceed`.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The governing cancellation token fired before the chain completed.
    #[error("pipeline execution was cancelled")]
    Cancelled,

    /// An interceptor failed and nothing upstream recovered.
    #[error("interceptor failed: {0}")]
    Interceptor(#[source] BoxError),
}

impl ExecutionError {
    /// Convert an interceptor error, unwrapping errors raised by nested executions.
    pub fn from_boxed(error: BoxError) -> Self {
        match error.downcast::<ExecutionError>() {
            Ok(inner) => *inner,
            Err(other) => ExecutionError::Interceptor(other),
        }
    }

    /// True for cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }

    /// Downcast the interceptor failure to a concrete error type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            ExecutionError::Interceptor(error) => error.downcast_ref::<E>(),
            ExecutionError::Cancelled => None,
        }
    }
}
