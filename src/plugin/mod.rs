//! Plugin system built on the application pipelines.
//!
//! # Data Flow
//! ```text
//! create_plugin(name, create_config, body)
//!     → install(scope, plugin, configure)
//!         → config = create_config(); configure(&mut config)
//!         → body(&mut PluginBuilder) records hooks and relative directives
//!         → relative targets resolved in the scope's registry
//!         → hooks registered on default stage phases
//!         → relative hooks registered on new phases placed before/after
//!           the targets' boundary phases
//!         → InstalledPlugin (config + phases per stage) stored in the registry
//! ```
//!
//! # Design Decisions
//! - Config types are explicit generic parameters, looked up by typed key
//! - Every interceptor carries its plugin id so a re-install replaces the
//!   previous one instead of stacking
//! - Targets are validated before anything is mutated, so a failed install
//!   leaves the scope untouched

pub mod builder;
pub mod install;
pub mod registry;
pub mod relative;

use thiserror::Error;

use crate::application::phases;
use crate::pipeline::{Phase, PipelineError};

pub use builder::{create_plugin, ApplicationPlugin, PluginBuilder, StageHooks};
pub use install::install;
pub use registry::{InstalledPlugin, PluginId, PluginKey, PluginRegistry, ShutdownHook, StagePhases};
pub use relative::RelativeOrder;

/// Errors raised while installing or looking up plugins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// A relative-ordering target is not installed in the same scope, or its
    /// recorded phases are missing from the pipeline.
    #[error("plugin `{0}` is not installed in this pipeline")]
    NotInstalled(PluginId),

    /// Lookup found no plugin in the scope or any ancestor scope.
    #[error("plugin `{0}` is missing; install it before use")]
    Missing(PluginId),

    /// Application-level install after routing froze the route pipelines.
    #[error("plugin `{0}` installed after routing; install application plugins first")]
    RoutingInstalled(PluginId),

    /// Pipeline structure rejected a phase operation.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Registration category of a plugin hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Call pipeline.
    Call,
    /// Receive pipeline.
    Receive,
    /// Send pipeline, transform step.
    Respond,
    /// Send pipeline, after the transform step.
    AfterTransform,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Call, Stage::Receive, Stage::Respond, Stage::AfterTransform];

    /// Phase used when no relative placement applies.
    pub fn default_phase(self) -> Phase {
        match self {
            Stage::Call => phases::call::PLUGINS.clone(),
            Stage::Receive => phases::receive::TRANSFORM.clone(),
            Stage::Respond => phases::send::TRANSFORM.clone(),
            Stage::AfterTransform => phases::send::AFTER.clone(),
        }
    }
}
