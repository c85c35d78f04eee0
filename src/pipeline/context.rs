//! Per-execution cursor over a pipeline's flattened interceptors.
//!
//! # Data Flow
//! ```text
//! execute(call, subject)
//!     → PipelineContext { index: 0, state: Running }
//!     → proceed() runs interceptor[index], index += 1
//!         → interceptor may mutate the subject
//!         → interceptor may call proceed() (nested, stack discipline)
//!         → interceptor may call finish() (no further interceptors)
//!     → cursor reaches the end → Completed
//! ```
//!
//! # Design Decisions
//! - `proceed` is a loop over the remaining interceptors; an interceptor that
//!   returns without calling `proceed` continues the chain implicitly
//! - Each interceptor runs inside a `select!` against the cancellation token so
//!   a cancelled call unwinds at its innermost pending `proceed`

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::pipeline::error::{ExecutionError, BoxError};
use crate::pipeline::pipeline::Pipeline;

/// Result type produced by interceptors.
pub type InterceptorResult = Result<(), BoxError>;

/// A stored interceptor.
///
/// The returned future borrows the context for the duration of the call.
pub type Interceptor<S, C> = Arc<
    dyn for<'a> Fn(&'a mut PipelineContext<S, C>) -> BoxFuture<'a, InterceptorResult> + Send + Sync,
>;

/// Wrap a closure as a shared [`Interceptor`].
///
/// ```ignore
/// let log = interceptor(|ctx: &mut PipelineContext<String, ()>| Box::pin(async move {
///     ctx.proceed().await?;
///     Ok(())
/// }));
/// ```
pub fn interceptor<S, C, F>(handler: F) -> Interceptor<S, C>
where
    F: for<'a> Fn(&'a mut PipelineContext<S, C>) -> BoxFuture<'a, InterceptorResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(handler)
}

/// Execution state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Interceptors remain to be run.
    Running,
    /// `finish()` was called; no further interceptors run.
    Finished,
    /// The cursor reached the end of the chain.
    Completed,
}

/// The cursor handed to every interceptor of one execution.
pub struct PipelineContext<S, C> {
    call: C,
    subject: S,
    interceptors: Arc<[Interceptor<S, C>]>,
    index: usize,
    state: ContextState,
    cancel: CancellationToken,
}

impl<S, C> PipelineContext<S, C>
where
    S: Send + 'static,
    C: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        call: C,
        subject: S,
        interceptors: Arc<[Interceptor<S, C>]>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            call,
            subject,
            interceptors,
            index: 0,
            state: ContextState::Running,
            cancel,
        }
    }

    /// The call object this execution belongs to.
    pub fn call(&self) -> &C {
        &self.call
    }

    /// Current subject.
    pub fn subject(&self) -> &S {
        &self.subject
    }

    /// Mutable access to the current subject.
    pub fn subject_mut(&mut self) -> &mut S {
        &mut self.subject
    }

    /// Replace the subject. Later interceptors observe the new value.
    pub fn set_subject(&mut self, subject: S) {
        self.subject = subject;
    }

    pub(crate) fn into_subject(self) -> S {
        self.subject
    }

    /// Current state of the cursor.
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// True once `finish()` was called.
    pub fn is_finished(&self) -> bool {
        self.state == ContextState::Finished
    }

    /// Stop the chain. The current interceptor keeps running; pending
    /// `proceed()` calls up the stack return without running anything else.
    pub fn finish(&mut self) {
        self.state = ContextState::Finished;
    }

    /// Token governing this execution.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run the remaining interceptors.
    ///
    /// Returns once the nested chain has unwound. Calling it at the end of the
    /// chain, or after `finish()`, is a no-op.
    pub fn proceed(&mut self) -> BoxFuture<'_, Result<(), ExecutionError>> {
        Box::pin(async move {
            loop {
                if self.cancel.is_cancelled() {
                    return Err(ExecutionError::Cancelled);
                }
                if self.state != ContextState::Running {
                    return Ok(());
                }
                let Some(next) = self.interceptors.get(self.index).cloned() else {
                    self.state = ContextState::Completed;
                    return Ok(());
                };
                self.index += 1;

                let cancel = self.cancel.clone();
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
                    result = next(&mut *self) => result.map_err(ExecutionError::from_boxed),
                };
                outcome?;
            }
        })
    }

    /// Replace the subject, then proceed.
    pub async fn proceed_with(&mut self, subject: S) -> Result<(), ExecutionError> {
        self.subject = subject;
        self.proceed().await
    }

    /// Execute a nested pipeline with the same call and a new subject.
    ///
    /// The nested execution is cancelled together with this one.
    pub fn fork<'p, T>(
        &self,
        pipeline: &'p Pipeline<T, C>,
        subject: T,
    ) -> BoxFuture<'p, Result<T, ExecutionError>>
    where
        T: Send + 'static,
    {
        let call = self.call.clone();
        let token = self.cancel.child_token();
        Box::pin(pipeline.execute_with_cancellation(call, subject, token))
    }
}

impl<S: std::fmt::Debug, C> std::fmt::Debug for PipelineContext<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("subject", &self.subject)
            .field("index", &self.index)
            .field("len", &self.interceptors.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(interceptors: Vec<Interceptor<Vec<u32>, ()>>) -> PipelineContext<Vec<u32>, ()> {
        PipelineContext::new((), Vec::new(), interceptors.into(), CancellationToken::new())
    }

    fn push(n: u32) -> Interceptor<Vec<u32>, ()> {
        interceptor(move |ctx: &mut PipelineContext<Vec<u32>, ()>| {
            Box::pin(async move {
                ctx.subject_mut().push(n);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_proceed_runs_all_and_completes() {
        let mut ctx = context(vec![push(1), push(2), push(3)]);
        ctx.proceed().await.unwrap();
        assert_eq!(ctx.subject(), &vec![1, 2, 3]);
        assert_eq!(ctx.state(), ContextState::Completed);

        // End of chain: nothing runs again.
        ctx.proceed().await.unwrap();
        assert_eq!(ctx.subject(), &vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_finish_stops_remaining() {
        let stop = interceptor(|ctx: &mut PipelineContext<Vec<u32>, ()>| {
            Box::pin(async move {
                ctx.subject_mut().push(99);
                ctx.finish();
                Ok(())
            })
        });
        let mut ctx = context(vec![push(1), stop, push(3)]);
        ctx.proceed().await.unwrap();
        assert_eq!(ctx.subject(), &vec![1, 99]);
        assert!(ctx.is_finished());
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let mut ctx = context(vec![push(1)]);
        ctx.cancellation().cancel();
        let err = ctx.proceed().await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(ctx.subject().is_empty());
    }
}
