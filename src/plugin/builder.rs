//! Plugin definitions and the builder their bodies run against.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::application::call::ApplicationCall;
use crate::application::content::{OutgoingContent, ReceiveRequest};
use crate::pipeline::{Interceptor, InterceptorResult, Phase, PipelineContext};
use crate::plugin::registry::{PluginId, PluginKey, ShutdownHook};
use crate::plugin::relative::RelativeOrder;

pub(crate) type CallInterceptor = Interceptor<(), ApplicationCall>;
pub(crate) type ReceiveInterceptor = Interceptor<ReceiveRequest, ApplicationCall>;
pub(crate) type SendInterceptor = Interceptor<OutgoingContent, ApplicationCall>;

/// Handlers recorded per stage.
#[derive(Default)]
pub struct StageHooks {
    pub(crate) call: Vec<CallInterceptor>,
    pub(crate) receive: Vec<ReceiveInterceptor>,
    pub(crate) respond: Vec<SendInterceptor>,
    pub(crate) after_transform: Vec<SendInterceptor>,
}

impl StageHooks {
    /// Run on every call.
    pub fn on_call<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<(), ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.call.push(Arc::new(handler));
    }

    /// Run when the handler reads the request body.
    pub fn on_call_receive<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<ReceiveRequest, ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.receive.push(Arc::new(handler));
    }

    /// Run when the handler responds, while the content is transformed.
    pub fn on_call_respond<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<OutgoingContent, ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.respond.push(Arc::new(handler));
    }

    /// Run when the handler responds, once the content has been transformed.
    pub fn after_transform<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<OutgoingContent, ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.after_transform.push(Arc::new(handler));
    }

    pub fn is_empty(&self) -> bool {
        self.call.is_empty()
            && self.receive.is_empty()
            && self.respond.is_empty()
            && self.after_transform.is_empty()
    }
}

impl fmt::Debug for StageHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHooks")
            .field("call", &self.call.len())
            .field("receive", &self.receive.len())
            .field("respond", &self.respond.len())
            .field("after_transform", &self.after_transform.len())
            .finish()
    }
}

/// Hooks to be placed relative to other plugins' phases.
#[derive(Debug)]
pub(crate) struct RelativeDirective {
    pub(crate) order: RelativeOrder,
    pub(crate) targets: Vec<PluginId>,
    pub(crate) hooks: StageHooks,
}

/// Collects what a plugin body registers during install.
pub struct PluginBuilder<Config> {
    id: PluginId,
    config: Arc<Config>,
    pub(crate) hooks: StageHooks,
    pub(crate) phase_hooks: Vec<(Phase, CallInterceptor)>,
    pub(crate) relative: Vec<RelativeDirective>,
    pub(crate) shutdown_hooks: Vec<ShutdownHook>,
}

impl<Config> PluginBuilder<Config> {
    pub(crate) fn new(id: PluginId, config: Arc<Config>) -> Self {
        Self {
            id,
            config,
            hooks: StageHooks::default(),
            phase_hooks: Vec::new(),
            relative: Vec::new(),
            shutdown_hooks: Vec::new(),
        }
    }

    pub fn plugin_id(&self) -> PluginId {
        self.id
    }

    /// Configuration after the installer's `configure` ran.
    pub fn plugin_config(&self) -> &Arc<Config> {
        &self.config
    }

    /// See [`StageHooks::on_call`].
    pub fn on_call<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<(), ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.on_call(handler);
    }

    /// See [`StageHooks::on_call_receive`].
    pub fn on_call_receive<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<ReceiveRequest, ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.on_call_receive(handler);
    }

    /// See [`StageHooks::on_call_respond`].
    pub fn on_call_respond<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<OutgoingContent, ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.on_call_respond(handler);
    }

    /// See [`StageHooks::after_transform`].
    pub fn after_transform<F>(&mut self, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<OutgoingContent, ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.after_transform(handler);
    }

    /// Intercept a specific call pipeline phase, e.g. `Monitoring` to wrap
    /// everything that follows.
    pub fn on_call_phase<F>(&mut self, phase: &Phase, handler: F)
    where
        F: for<'a> Fn(&'a mut PipelineContext<(), ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.phase_hooks.push((phase.clone(), Arc::new(handler)));
    }

    /// Run `hook` once when the application stops, after in-flight calls
    /// have drained. Re-installing the plugin discards hooks of the
    /// previous install.
    pub fn on_shutdown<F>(&mut self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shutdown_hooks.push(Arc::new(hook));
    }

    /// Register hooks that run before the earliest phase of every target.
    ///
    /// Targets must already be installed in the same scope.
    pub fn before_plugins<I, B>(&mut self, targets: I, build: B)
    where
        I: IntoIterator<Item = PluginId>,
        B: FnOnce(&mut StageHooks),
    {
        self.relative_to(RelativeOrder::Before, targets, build);
    }

    /// Register hooks that run after the latest phase of every target.
    pub fn after_plugins<I, B>(&mut self, targets: I, build: B)
    where
        I: IntoIterator<Item = PluginId>,
        B: FnOnce(&mut StageHooks),
    {
        self.relative_to(RelativeOrder::After, targets, build);
    }

    fn relative_to<I, B>(&mut self, order: RelativeOrder, targets: I, build: B)
    where
        I: IntoIterator<Item = PluginId>,
        B: FnOnce(&mut StageHooks),
    {
        let mut hooks = StageHooks::default();
        build(&mut hooks);
        self.relative.push(RelativeDirective {
            order,
            targets: targets.into_iter().collect(),
            hooks,
        });
    }
}

/// A named plugin: config factory plus the body that registers its hooks.
pub struct ApplicationPlugin<Config> {
    key: PluginKey<Config>,
    create_config: Arc<dyn Fn() -> Config + Send + Sync>,
    body: Arc<dyn Fn(&mut PluginBuilder<Config>) + Send + Sync>,
}

impl<Config> ApplicationPlugin<Config> {
    pub fn id(&self) -> PluginId {
        self.key.id()
    }

    /// Typed key for registry lookups.
    pub fn key(&self) -> &PluginKey<Config> {
        &self.key
    }

    pub(crate) fn create_config(&self) -> Config {
        (self.create_config)()
    }

    pub(crate) fn run_body(&self, builder: &mut PluginBuilder<Config>) {
        (self.body)(builder)
    }
}

impl<Config> Clone for ApplicationPlugin<Config> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            create_config: Arc::clone(&self.create_config),
            body: Arc::clone(&self.body),
        }
    }
}

impl<Config> fmt::Debug for ApplicationPlugin<Config> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApplicationPlugin({})", self.key.id())
    }
}

/// Define a plugin.
///
/// `create_config` builds a fresh configuration for every install; `body`
/// registers hooks through the [`PluginBuilder`].
pub fn create_plugin<Config, F, B>(id: PluginId, create_config: F, body: B) -> ApplicationPlugin<Config>
where
    F: Fn() -> Config + Send + Sync + 'static,
    B: Fn(&mut PluginBuilder<Config>) + Send + Sync + 'static,
{
    ApplicationPlugin {
        key: PluginKey::new(id),
        create_config: Arc::new(create_config),
        body: Arc::new(body),
    }
}
