//! Ordered phases and their interceptors.
//!
//! # Responsibilities
//! - Maintain the phase order (append, insert before/after a reference)
//! - Attach interceptors to registered phases
//! - Merge another pipeline while keeping relative phase order
//! - Flatten phases into one interceptor list and execute it
//!
//! # Design Decisions
//! - Structural mutation takes `&mut self`, execution takes `&self`: a pipeline
//!   cannot change while a call runs against it
//! - The flattened list is built on first execution and cached until the next
//!   structural change
//! - Each phase remembers how it was inserted so `merge` can reproduce it

use std::fmt;
use std::sync::{Arc, OnceLock};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::pipeline::context::{Interceptor, InterceptorResult, PipelineContext};
use crate::pipeline::error::{ExecutionError, PipelineError};
use crate::pipeline::phase::Phase;

/// How a phase was placed into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseRelation {
    /// Appended to the end.
    Last,
    /// Inserted immediately before the reference phase.
    Before(Phase),
    /// Inserted immediately after the reference phase.
    After(Phase),
}

struct InterceptorEntry<S, C> {
    handler: Interceptor<S, C>,
    owner: Option<&'static str>,
}

impl<S, C> Clone for InterceptorEntry<S, C> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            owner: self.owner,
        }
    }
}

struct PhaseContent<S, C> {
    phase: Phase,
    relation: PhaseRelation,
    interceptors: Vec<InterceptorEntry<S, C>>,
}

impl<S, C> Clone for PhaseContent<S, C> {
    fn clone(&self) -> Self {
        Self {
            phase: self.phase.clone(),
            relation: self.relation.clone(),
            interceptors: self.interceptors.clone(),
        }
    }
}

/// An ordered sequence of phases, each holding ordered interceptors.
pub struct Pipeline<S, C> {
    phases: Vec<PhaseContent<S, C>>,
    cached: OnceLock<Arc<[Interceptor<S, C>]>>,
}

impl<S, C> Pipeline<S, C>
where
    S: Send + 'static,
    C: Clone + Send + Sync + 'static,
{
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            phases: Vec::new(),
            cached: OnceLock::new(),
        }
    }

    /// Create a pipeline holding `phases` in the given order.
    pub fn with_phases<I>(phases: I) -> Self
    where
        I: IntoIterator<Item = Phase>,
    {
        let mut pipeline = Self::new();
        for phase in phases {
            pipeline.add_phase(phase);
        }
        pipeline
    }

    /// Current phase order.
    pub fn phases(&self) -> Vec<Phase> {
        self.phases.iter().map(|c| c.phase.clone()).collect()
    }

    /// Position of `phase` in the phase order.
    pub fn index_of(&self, phase: &Phase) -> Option<usize> {
        self.phases.iter().position(|c| &c.phase == phase)
    }

    /// True if `phase` is registered.
    pub fn contains_phase(&self, phase: &Phase) -> bool {
        self.index_of(phase).is_some()
    }

    /// True when no interceptors are registered, whatever the phase count.
    pub fn is_empty(&self) -> bool {
        self.interceptor_count() == 0
    }

    /// Total number of interceptors.
    pub fn interceptor_count(&self) -> usize {
        self.phases.iter().map(|c| c.interceptors.len()).sum()
    }

    /// Number of interceptors on one phase (0 when absent).
    pub fn phase_interceptor_count(&self, phase: &Phase) -> usize {
        self.index_of(phase)
            .map(|i| self.phases[i].interceptors.len())
            .unwrap_or(0)
    }

    /// Append `phase`. No-op if it is already present.
    pub fn add_phase(&mut self, phase: Phase) {
        if self.contains_phase(&phase) {
            return;
        }
        tracing::trace!(phase = %phase, "Adding phase");
        self.phases.push(PhaseContent {
            phase,
            relation: PhaseRelation::Last,
            interceptors: Vec::new(),
        });
        self.invalidate();
    }

    /// Insert `phase` immediately before `reference`.
    pub fn insert_phase_before(&mut self, reference: &Phase, phase: Phase) -> Result<(), PipelineError> {
        let index = self.insertion_point(reference, &phase)?;
        tracing::trace!(phase = %phase, reference = %reference, "Inserting phase before");
        self.phases.insert(
            index,
            PhaseContent {
                phase,
                relation: PhaseRelation::Before(reference.clone()),
                interceptors: Vec::new(),
            },
        );
        self.invalidate();
        Ok(())
    }

    /// Insert `phase` immediately after `reference`.
    pub fn insert_phase_after(&mut self, reference: &Phase, phase: Phase) -> Result<(), PipelineError> {
        let index = self.insertion_point(reference, &phase)?;
        tracing::trace!(phase = %phase, reference = %reference, "Inserting phase after");
        self.phases.insert(
            index + 1,
            PhaseContent {
                phase,
                relation: PhaseRelation::After(reference.clone()),
                interceptors: Vec::new(),
            },
        );
        self.invalidate();
        Ok(())
    }

    fn insertion_point(&self, reference: &Phase, phase: &Phase) -> Result<usize, PipelineError> {
        if self.contains_phase(phase) {
            return Err(PipelineError::DuplicatePhase(phase.clone()));
        }
        self.index_of(reference)
            .ok_or_else(|| PipelineError::PhaseNotFound(reference.clone()))
    }

    /// Append `handler` to the interceptors of `phase`.
    pub fn intercept<F>(&mut self, phase: &Phase, handler: F) -> Result<(), PipelineError>
    where
        F: for<'a> Fn(&'a mut PipelineContext<S, C>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.intercept_shared(phase, None, Arc::new(handler))
    }

    /// Append an already shared interceptor, optionally tagged with its owner.
    pub fn intercept_shared(
        &mut self,
        phase: &Phase,
        owner: Option<&'static str>,
        handler: Interceptor<S, C>,
    ) -> Result<(), PipelineError> {
        let index = self
            .index_of(phase)
            .ok_or_else(|| PipelineError::PhaseNotFound(phase.clone()))?;
        self.phases[index]
            .interceptors
            .push(InterceptorEntry { handler, owner });
        self.invalidate();
        Ok(())
    }

    /// Remove every interceptor tagged with `owner`. Phases stay in place.
    pub fn remove_owned(&mut self, owner: &str) -> usize {
        let mut removed = 0;
        for content in &mut self.phases {
            let before = content.interceptors.len();
            content.interceptors.retain(|e| e.owner != Some(owner));
            removed += before - content.interceptors.len();
        }
        if removed > 0 {
            self.invalidate();
        }
        removed
    }

    /// Remove `phase` if it has no interceptors and no other phase was
    /// placed relative to it. Returns whether it was removed.
    pub fn remove_phase_if_unused(&mut self, phase: &Phase) -> bool {
        let Some(index) = self.index_of(phase) else {
            return false;
        };
        if !self.phases[index].interceptors.is_empty() {
            return false;
        }
        let referenced = self.phases.iter().any(|c| match &c.relation {
            PhaseRelation::Before(reference) | PhaseRelation::After(reference) => reference == phase,
            PhaseRelation::Last => false,
        });
        if referenced {
            return false;
        }
        tracing::trace!(phase = %phase, "Removing unused phase");
        self.phases.remove(index);
        self.invalidate();
        true
    }

    /// Merge `other` into this pipeline.
    ///
    /// Missing phases are placed with the relation they had in `other`, then
    /// `other`'s interceptors are appended phase by phase.
    pub fn merge(&mut self, other: &Pipeline<S, C>) -> Result<(), PipelineError> {
        for content in &other.phases {
            if !self.contains_phase(&content.phase) {
                match &content.relation {
                    PhaseRelation::Last => self.add_phase(content.phase.clone()),
                    PhaseRelation::Before(reference) => {
                        self.insert_phase_before(reference, content.phase.clone())?
                    }
                    PhaseRelation::After(reference) => {
                        self.insert_phase_after(reference, content.phase.clone())?
                    }
                }
            }
            if let Some(index) = self.index_of(&content.phase) {
                self.phases[index]
                    .interceptors
                    .extend(content.interceptors.iter().cloned());
            }
        }
        self.invalidate();
        Ok(())
    }

    fn invalidate(&mut self) {
        self.cached.take();
    }

    /// Flattened interceptor list: phase order, then registration order.
    pub(crate) fn interceptors(&self) -> Arc<[Interceptor<S, C>]> {
        Arc::clone(self.cached.get_or_init(|| {
            self.phases
                .iter()
                .flat_map(|c| c.interceptors.iter().map(|e| Arc::clone(&e.handler)))
                .collect::<Vec<_>>()
                .into()
        }))
    }

    /// Run every interceptor against `subject` and return the final subject.
    pub async fn execute(&self, call: C, subject: S) -> Result<S, ExecutionError> {
        self.execute_with_cancellation(call, subject, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), aborted when `cancel` fires.
    pub async fn execute_with_cancellation(
        &self,
        call: C,
        subject: S,
        cancel: CancellationToken,
    ) -> Result<S, ExecutionError> {
        let mut context = PipelineContext::new(call, subject, self.interceptors(), cancel);
        context.proceed().await?;
        Ok(context.into_subject())
    }
}

impl<S, C> Default for Pipeline<S, C>
where
    S: Send + 'static,
    C: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, C> Clone for Pipeline<S, C> {
    fn clone(&self) -> Self {
        Self {
            phases: self.phases.clone(),
            cached: OnceLock::new(),
        }
    }
}

impl<S, C> fmt::Debug for Pipeline<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for content in &self.phases {
            list.entry(&format_args!(
                "{} ({} handlers)",
                content.phase,
                content.interceptors.len()
            ));
        }
        list.finish()
    }
}
