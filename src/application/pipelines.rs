//! The call, receive and send pipelines of one scope.

use std::sync::Arc;

use crate::application::call::ApplicationCall;
use crate::application::content::{OutgoingContent, ReceiveRequest};
use crate::application::phases;
use crate::pipeline::{Pipeline, PipelineError};
use crate::plugin::registry::{PluginRegistry, StagePhases};
use crate::plugin::Stage;

/// Pipeline executed once per call. The subject carries no data.
pub type CallPipeline = Pipeline<(), ApplicationCall>;
/// Pipeline executed when a handler reads the request body.
pub type ReceivePipeline = Pipeline<ReceiveRequest, ApplicationCall>;
/// Pipeline executed when a handler responds.
pub type SendPipeline = Pipeline<OutgoingContent, ApplicationCall>;

/// Pipelines and plugin registry owned by one scope (the application or a route).
///
/// Pipelines are shared copy-on-write: calls hold their own `Arc`, so a
/// mutation after calls started never affects a call in flight.
#[derive(Debug)]
pub struct ApplicationCallPipeline {
    call: Arc<CallPipeline>,
    receive: Arc<ReceivePipeline>,
    send: Arc<SendPipeline>,
    registry: PluginRegistry,
}

impl ApplicationCallPipeline {
    /// Create pipelines with the well-known phase layouts.
    pub fn new() -> Self {
        Self {
            call: Arc::new(Pipeline::with_phases(phases::call::layout())),
            receive: Arc::new(Pipeline::with_phases(phases::receive::layout())),
            send: Arc::new(Pipeline::with_phases(phases::send::layout())),
            registry: PluginRegistry::new(),
        }
    }

    pub fn call_pipeline(&self) -> &CallPipeline {
        &self.call
    }

    pub fn call_pipeline_mut(&mut self) -> &mut CallPipeline {
        Arc::make_mut(&mut self.call)
    }

    pub fn receive_pipeline(&self) -> &ReceivePipeline {
        &self.receive
    }

    pub fn receive_pipeline_mut(&mut self) -> &mut ReceivePipeline {
        Arc::make_mut(&mut self.receive)
    }

    pub fn send_pipeline(&self) -> &SendPipeline {
        &self.send
    }

    pub fn send_pipeline_mut(&mut self) -> &mut SendPipeline {
        Arc::make_mut(&mut self.send)
    }

    pub fn shared_call(&self) -> Arc<CallPipeline> {
        Arc::clone(&self.call)
    }

    pub fn shared_receive(&self) -> Arc<ReceivePipeline> {
        Arc::clone(&self.receive)
    }

    pub fn shared_send(&self) -> Arc<SendPipeline> {
        Arc::clone(&self.send)
    }

    /// Plugins installed in this scope.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    /// Merge the three pipelines of `other` into this one. Registries are not merged.
    pub fn merge(&mut self, other: &ApplicationCallPipeline) -> Result<(), PipelineError> {
        self.call_pipeline_mut().merge(&other.call)?;
        self.receive_pipeline_mut().merge(&other.receive)?;
        self.send_pipeline_mut().merge(&other.send)?;
        Ok(())
    }

    /// Remove every interceptor registered by `owner` across the three pipelines.
    pub(crate) fn remove_owned(&mut self, owner: &str) -> usize {
        self.call_pipeline_mut().remove_owned(owner)
            + self.receive_pipeline_mut().remove_owned(owner)
            + self.send_pipeline_mut().remove_owned(owner)
    }

    /// Drop the given phases from their stage's pipeline where nothing uses them.
    pub(crate) fn remove_unused_phases(&mut self, phases: &StagePhases) -> usize {
        let mut removed = 0;
        for phase in phases.get(Stage::Call) {
            removed += usize::from(self.call_pipeline_mut().remove_phase_if_unused(phase));
        }
        for phase in phases.get(Stage::Receive) {
            removed += usize::from(self.receive_pipeline_mut().remove_phase_if_unused(phase));
        }
        for phase in phases
            .get(Stage::Respond)
            .iter()
            .chain(phases.get(Stage::AfterTransform))
        {
            removed += usize::from(self.send_pipeline_mut().remove_phase_if_unused(phase));
        }
        removed
    }
}

impl Default for ApplicationCallPipeline {
    fn default() -> Self {
        Self::new()
    }
}
