//! Route tree with per-route pipelines and plugin scopes.
//!
//! # Responsibilities
//! - Build a tree of routes, each owning an `ApplicationCallPipeline`
//! - Install plugins into a single route's scope
//! - Look up plugins walking from a route to its ancestors
//! - Freeze the tree into per-route merged pipelines
//!
//! # Design Decisions
//! - Nodes live in an arena indexed by `RouteId`; parents are indices
//! - Scoped lookup happens on demand, never copied at install time
//! - The frozen table is immutable and shared by every call

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::application::call::ApplicationCall;
use crate::application::phases;
use crate::application::pipelines::{
    ApplicationCallPipeline, CallPipeline, ReceivePipeline, SendPipeline,
};
use crate::attributes::AttributeKey;
use crate::pipeline::{interceptor, Interceptor, InterceptorResult, Pipeline, PipelineContext, PipelineError};
use crate::plugin::{self, ApplicationPlugin, PluginId, PluginKey};
use crate::routing::matcher::{parse_path, split_path, Segment};
use crate::routing::RoutingError;

/// Route selected for the call.
pub const MATCHED_ROUTE: AttributeKey<RouteId> = AttributeKey::new("MatchedRoute");
/// Parameters captured from the path.
pub const ROUTE_PARAMETERS: AttributeKey<Parameters> = AttributeKey::new("RouteParameters");

/// Index of a route in its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(usize);

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

/// Path parameters captured during matching.
pub type Parameters = HashMap<String, String>;

type Handler = Interceptor<(), ApplicationCall>;

struct RouteNode {
    parent: Option<RouteId>,
    segment: Option<Segment>,
    children: Vec<RouteId>,
    scope: ApplicationCallPipeline,
    handlers: Vec<(Option<Method>, Handler)>,
}

/// Mutable route tree, built during setup.
pub struct Routing {
    nodes: Vec<RouteNode>,
}

impl Routing {
    /// Create a tree holding only the root route (`/`).
    pub fn new() -> Self {
        Self {
            nodes: vec![RouteNode {
                parent: None,
                segment: None,
                children: Vec::new(),
                scope: ApplicationCallPipeline::new(),
                handlers: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> RouteId {
        RouteId(0)
    }

    fn node(&self, route: RouteId) -> Result<&RouteNode, RoutingError> {
        self.nodes.get(route.0).ok_or(RoutingError::UnknownRoute(route))
    }

    fn node_mut(&mut self, route: RouteId) -> Result<&mut RouteNode, RoutingError> {
        self.nodes
            .get_mut(route.0)
            .ok_or(RoutingError::UnknownRoute(route))
    }

    /// Child route of `parent` for `path`, creating intermediate routes as needed.
    pub fn route(&mut self, parent: RouteId, path: &str) -> Result<RouteId, RoutingError> {
        self.node(parent)?;
        let mut current = parent;
        for segment in parse_path(path)? {
            let existing = self.nodes[current.0]
                .children
                .iter()
                .copied()
                .find(|child| self.nodes[child.0].segment.as_ref() == Some(&segment));
            current = match existing {
                Some(child) => child,
                None => {
                    let child = RouteId(self.nodes.len());
                    self.nodes.push(RouteNode {
                        parent: Some(current),
                        segment: Some(segment),
                        children: Vec::new(),
                        scope: ApplicationCallPipeline::new(),
                        handlers: Vec::new(),
                    });
                    self.nodes[current.0].children.push(child);
                    child
                }
            };
        }
        Ok(current)
    }

    /// Register a handler on `route`. `None` accepts any method.
    pub fn handle<F>(&mut self, route: RouteId, method: Option<Method>, handler: F) -> Result<(), RoutingError>
    where
        F: for<'a> Fn(&'a mut PipelineContext<(), ApplicationCall>) -> BoxFuture<'a, InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        self.node_mut(route)?
            .handlers
            .push((method, Arc::new(handler)));
        Ok(())
    }

    /// Scope (pipelines and registry) of `route`.
    pub fn scope(&self, route: RouteId) -> Result<&ApplicationCallPipeline, RoutingError> {
        Ok(&self.node(route)?.scope)
    }

    /// Install `plugin` on `route` and its subtree only.
    pub fn install<Config, F>(
        &mut self,
        route: RouteId,
        plugin: &ApplicationPlugin<Config>,
        configure: F,
    ) -> Result<Arc<Config>, RoutingError>
    where
        Config: Send + Sync + 'static,
        F: FnOnce(&mut Config),
    {
        let scope = &mut self.node_mut(route)?.scope;
        let config = plugin::install(scope, plugin, configure)?;
        tracing::debug!(plugin = plugin.id(), route = %route, "Plugin installed on route");
        Ok(config)
    }

    /// Nearest configuration of `key` from `route` up through its ancestors.
    pub fn find_plugin<Config: Send + Sync + 'static>(
        &self,
        route: RouteId,
        key: &PluginKey<Config>,
    ) -> Option<Arc<Config>> {
        find_in_chain(route, key, |id| {
            self.nodes.get(id.0).map(|n| (n.parent, &n.scope))
        })
    }

    /// Route ids from the root down to `route`.
    fn chain(&self, route: RouteId) -> Vec<RouteId> {
        let mut chain = vec![route];
        let mut current = self.nodes[route.0].parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.nodes[parent.0].parent;
        }
        chain.reverse();
        chain
    }

    /// Freeze into per-route pipelines.
    ///
    /// Each route's call pipeline merges its chain's call pipelines, then adds
    /// its handlers on the `Call` phase. Receive and send pipelines start from
    /// the application's and merge the chain's on top. When a plugin is
    /// installed on several routes of one chain, only the deepest install
    /// contributes hooks.
    ///
    /// Fails with `DuplicatePlugin` if a route installs a plugin the
    /// application already has.
    pub(crate) fn build(self, application: &ApplicationCallPipeline) -> Result<RoutingTable, RoutingError> {
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some(id) = node
                .scope
                .registry()
                .ids()
                .into_iter()
                .find(|id| application.registry().contains(*id))
            {
                return Err(RoutingError::DuplicatePlugin(id, RouteId(index)));
            }
        }

        let mut merged = Vec::with_capacity(self.nodes.len());
        for index in 0..self.nodes.len() {
            let mut call = CallPipeline::with_phases(phases::call::layout());
            let mut receive: ReceivePipeline = application.receive_pipeline().clone();
            let mut send: SendPipeline = application.send_pipeline().clone();
            let chain = self.chain(RouteId(index));
            for (depth, id) in chain.iter().enumerate() {
                let scope = &self.nodes[id.0].scope;
                let shadowed = self.shadowed(scope, &chain[depth + 1..]);
                merge_visible(&mut call, scope.call_pipeline(), &shadowed)?;
                merge_visible(&mut receive, scope.receive_pipeline(), &shadowed)?;
                merge_visible(&mut send, scope.send_pipeline(), &shadowed)?;
            }
            for (method, handler) in &self.nodes[index].handlers {
                call.intercept_shared(
                    &phases::call::CALL,
                    None,
                    route_handler(method.clone(), Arc::clone(handler)),
                )?;
            }
            merged.push((Arc::new(call), Arc::new(receive), Arc::new(send)));
        }

        let nodes = self
            .nodes
            .into_iter()
            .zip(merged)
            .map(|(node, (call, receive, send))| FrozenRoute {
                parent: node.parent,
                segment: node.segment,
                children: node.children,
                has_handlers: !node.handlers.is_empty(),
                scope: node.scope,
                call,
                receive,
                send,
            })
            .collect::<Vec<_>>();
        tracing::debug!(routes = nodes.len(), "Routing table built");
        Ok(RoutingTable { nodes })
    }

    /// Plugins of `scope` installed again on one of the `deeper` routes.
    fn shadowed(&self, scope: &ApplicationCallPipeline, deeper: &[RouteId]) -> Vec<PluginId> {
        scope
            .registry()
            .ids()
            .into_iter()
            .filter(|id| {
                deeper
                    .iter()
                    .any(|route| self.nodes[route.0].scope.registry().contains(*id))
            })
            .collect()
    }
}

/// Merge `source` into `target`, leaving out interceptors owned by `shadowed`.
fn merge_visible<S>(
    target: &mut Pipeline<S, ApplicationCall>,
    source: &Pipeline<S, ApplicationCall>,
    shadowed: &[PluginId],
) -> Result<(), PipelineError>
where
    S: Send + 'static,
{
    if shadowed.is_empty() {
        return target.merge(source);
    }
    let mut visible = source.clone();
    for owner in shadowed {
        visible.remove_owned(owner);
    }
    target.merge(&visible)
}

impl Default for Routing {
    fn default() -> Self {
        Self::new()
    }
}

fn find_in_chain<'s, Config, F>(
    route: RouteId,
    key: &PluginKey<Config>,
    lookup: F,
) -> Option<Arc<Config>>
where
    Config: Send + Sync + 'static,
    F: Fn(RouteId) -> Option<(Option<RouteId>, &'s ApplicationCallPipeline)>,
{
    let mut current = Some(route);
    while let Some(id) = current {
        let (parent, scope) = lookup(id)?;
        if let Some(config) = scope.registry().get(key) {
            return Some(config);
        }
        current = parent;
    }
    None
}

/// Run `handler` unless the call is already handled or the method differs.
fn route_handler(method: Option<Method>, handler: Handler) -> Handler {
    interceptor(move |ctx: &mut PipelineContext<(), ApplicationCall>| {
        let handler = Arc::clone(&handler);
        let method = method.clone();
        Box::pin(async move {
            let call = ctx.call();
            if call.is_responded() || method.as_ref().is_some_and(|m| m != call.method()) {
                return Ok(());
            }
            handler(ctx).await
        })
    })
}

struct FrozenRoute {
    parent: Option<RouteId>,
    segment: Option<Segment>,
    children: Vec<RouteId>,
    has_handlers: bool,
    scope: ApplicationCallPipeline,
    call: Arc<CallPipeline>,
    receive: Arc<ReceivePipeline>,
    send: Arc<SendPipeline>,
}

/// Result of matching a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: RouteId,
    pub parameters: Parameters,
}

/// Immutable route tree with merged pipelines.
pub struct RoutingTable {
    nodes: Vec<FrozenRoute>,
}

impl RoutingTable {
    /// Deepest route with handlers whose segments match `path` exactly.
    /// Literal children are tried before parameter children.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let segments: Vec<&str> = split_path(path).collect();
        let mut parameters = Parameters::new();
        let route = self.walk(RouteId(0), &segments, &mut parameters)?;
        Some(RouteMatch { route, parameters })
    }

    fn walk(&self, route: RouteId, segments: &[&str], parameters: &mut Parameters) -> Option<RouteId> {
        let node = &self.nodes[route.0];
        let Some((head, rest)) = segments.split_first() else {
            return node.has_handlers.then_some(route);
        };

        let literal_first = node
            .children
            .iter()
            .filter(|c| self.segment_is_literal(**c))
            .chain(node.children.iter().filter(|c| !self.segment_is_literal(**c)));
        for &child in literal_first {
            let Some(segment) = &self.nodes[child.0].segment else {
                continue;
            };
            if !segment.matches(head) {
                continue;
            }
            if let Segment::Parameter(name) = segment {
                parameters.insert(name.clone(), head.to_string());
            }
            if let Some(found) = self.walk(child, rest, parameters) {
                return Some(found);
            }
            if let Segment::Parameter(name) = segment {
                parameters.remove(name);
            }
        }
        None
    }

    fn segment_is_literal(&self, route: RouteId) -> bool {
        self.nodes[route.0]
            .segment
            .as_ref()
            .is_some_and(Segment::is_literal)
    }

    /// Nearest configuration of `key` from `route` up through its ancestors.
    pub fn find_plugin<Config: Send + Sync + 'static>(
        &self,
        route: RouteId,
        key: &PluginKey<Config>,
    ) -> Option<Arc<Config>> {
        find_in_chain(route, key, |id| {
            self.nodes.get(id.0).map(|n| (n.parent, &n.scope))
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run the shutdown hooks of route-scoped plugins, routes in creation order.
    pub(crate) fn run_shutdown_hooks(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| node.scope.registry().run_shutdown_hooks())
            .sum()
    }

    /// Routing interceptor for the application's `Call` phase.
    ///
    /// Matches the path, switches the call to the route's receive and send
    /// pipelines, then forks into the route's call pipeline.
    pub(crate) fn routing_interceptor(table: Arc<RoutingTable>) -> Interceptor<(), ApplicationCall> {
        interceptor(move |ctx: &mut PipelineContext<(), ApplicationCall>| {
            let table = Arc::clone(&table);
            Box::pin(async move {
                let call = ctx.call().clone();
                let Some(matched) = table.resolve(call.path()) else {
                    tracing::debug!(call_id = %call.id(), path = %call.path(), "No route matched");
                    return Ok(());
                };
                let route = &table.nodes[matched.route.0];
                tracing::trace!(call_id = %call.id(), route = %matched.route, "Route matched");

                call.attributes().put(&MATCHED_ROUTE, matched.route);
                call.attributes().put(&ROUTE_PARAMETERS, matched.parameters);
                call.set_pipelines(Arc::clone(&route.receive), Arc::clone(&route.send));

                let pipeline: &CallPipeline = &route.call;
                ctx.fork(pipeline, ()).await?;
                Ok(())
            })
        })
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingTable")
            .field("routes", &self.nodes.len())
            .finish()
    }
}
