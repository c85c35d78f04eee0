//! Application layer: the call object and the pipelines it runs through.
//!
//! # Data Flow
//! ```text
//! engine creates ApplicationCall
//!     → Application::execute (call pipeline)
//!         Setup → Monitoring → Plugins → Call (routing) → Fallback
//!     → handler: call.receive_text()  (receive pipeline)
//!     → handler: call.respond(content) (send pipeline → commit)
//!     → engine writes the committed response
//! ```

pub mod call;
pub mod content;
pub mod phases;
pub mod pipelines;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::pipeline::ExecutionError;
use crate::plugin::{self, ApplicationPlugin, PluginError, PluginKey};
use crate::routing::{RouteId, Routing, RoutingError, RoutingTable};

pub use call::{ApplicationCall, CallError, CallRequest, CallResponse};
pub use content::{OutgoingContent, ReceiveRequest, ReceiveType, ReceivedValue};
pub use pipelines::{ApplicationCallPipeline, CallPipeline, ReceivePipeline, SendPipeline};

/// Owner tag of the routing interceptor.
const ROUTING_ID: &str = "Routing";

/// Root scope: application pipelines, plugins and the optional routing table.
#[derive(Debug, Default)]
pub struct Application {
    pipeline: ApplicationCallPipeline,
    routing: Option<Arc<RoutingTable>>,
}

impl Application {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pipeline(&self) -> &ApplicationCallPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut ApplicationCallPipeline {
        &mut self.pipeline
    }

    /// Install `plugin` at application level.
    ///
    /// Fails with `RoutingInstalled` once routing is installed: route
    /// pipelines already hold a copy of the application's receive and send
    /// pipelines.
    pub fn install<Config, F>(
        &mut self,
        plugin: &ApplicationPlugin<Config>,
        configure: F,
    ) -> Result<Arc<Config>, PluginError>
    where
        Config: Send + Sync + 'static,
        F: FnOnce(&mut Config),
    {
        if self.routing.is_some() {
            return Err(PluginError::RoutingInstalled(plugin.id()));
        }
        plugin::install(&mut self.pipeline, plugin, configure)
    }

    /// Configuration of an application-level plugin.
    pub fn plugin<Config: Send + Sync + 'static>(
        &self,
        key: &PluginKey<Config>,
    ) -> Result<Arc<Config>, PluginError> {
        self.pipeline.registry().plugin(key)
    }

    pub fn plugin_or_none<Config: Send + Sync + 'static>(&self, key: &PluginKey<Config>) -> Option<Arc<Config>> {
        self.pipeline.registry().get(key)
    }

    /// Nearest configuration of `key` seen from `route`: the route, its
    /// ancestors, then the application.
    pub fn find_plugin<Config: Send + Sync + 'static>(
        &self,
        route: RouteId,
        key: &PluginKey<Config>,
    ) -> Result<Arc<Config>, PluginError> {
        self.routing
            .as_ref()
            .and_then(|table| table.find_plugin(route, key))
            .or_else(|| self.pipeline.registry().get(key))
            .ok_or(PluginError::Missing(key.id()))
    }

    /// Freeze `routing` and dispatch matched calls into it from the `Call` phase.
    ///
    /// Route pipelines snapshot the application's receive and send pipelines,
    /// so application plugins must be installed first. Replaces a previously
    /// installed routing table.
    pub fn install_routing(&mut self, routing: Routing) -> Result<Arc<RoutingTable>, RoutingError> {
        let table = Arc::new(routing.build(&self.pipeline)?);
        let pipeline = self.pipeline.call_pipeline_mut();
        pipeline.remove_owned(ROUTING_ID);
        pipeline
            .intercept_shared(
                &phases::call::CALL,
                Some(ROUTING_ID),
                RoutingTable::routing_interceptor(Arc::clone(&table)),
            )?;
        self.routing = Some(Arc::clone(&table));
        tracing::debug!(routes = table.len(), "Routing installed");
        Ok(table)
    }

    pub fn routing(&self) -> Option<&Arc<RoutingTable>> {
        self.routing.as_ref()
    }

    /// Run plugin shutdown hooks: application plugins first, then route-scoped
    /// ones. Returns the number of hooks run.
    pub fn shutdown(&self) -> usize {
        let mut ran = self.pipeline.registry().run_shutdown_hooks();
        if let Some(table) = &self.routing {
            ran += table.run_shutdown_hooks();
        }
        tracing::info!(hooks = ran, "Application stopped");
        ran
    }

    /// Create a call bound to the application's receive and send pipelines.
    pub fn create_call(&self, request: CallRequest) -> ApplicationCall {
        ApplicationCall::new(request, self.pipeline.shared_receive(), self.pipeline.shared_send())
    }

    /// Run the call pipeline once for `call`, governed by the call's token.
    pub async fn execute(&self, call: &ApplicationCall) -> Result<(), ExecutionError> {
        self.execute_with_cancellation(call, call.cancellation().clone())
            .await
    }

    /// Run the call pipeline once for `call`, governed by `cancel`.
    pub async fn execute_with_cancellation(
        &self,
        call: &ApplicationCall,
        cancel: CancellationToken,
    ) -> Result<(), ExecutionError> {
        let pipeline = self.pipeline.shared_call();
        pipeline
            .execute_with_cancellation(call.clone(), (), cancel)
            .await
    }
}
