//! Installing plugins into a scope.

use std::sync::Arc;

use crate::application::call::ApplicationCall;
use crate::application::pipelines::ApplicationCallPipeline;
use crate::observability::metrics;
use crate::pipeline::{Interceptor, Phase, Pipeline, PipelineError};
use crate::plugin::builder::{ApplicationPlugin, PluginBuilder, RelativeDirective};
use crate::plugin::registry::{InstalledPlugin, PluginId, StagePhases};
use crate::plugin::relative::{self, sorted_phases};
use crate::plugin::{PluginError, Stage};

/// Install `plugin` into `scope`.
///
/// Builds a fresh config, lets `configure` adjust it, runs the plugin body,
/// then registers its hooks. Installing a plugin that is already present in
/// the same scope replaces it. Returns the final configuration.
pub fn install<Config, F>(
    scope: &mut ApplicationCallPipeline,
    plugin: &ApplicationPlugin<Config>,
    configure: F,
) -> Result<Arc<Config>, PluginError>
where
    Config: Send + Sync + 'static,
    F: FnOnce(&mut Config),
{
    let id = plugin.id();
    let mut config = plugin.create_config();
    configure(&mut config);
    let config = Arc::new(config);

    let mut builder = PluginBuilder::new(id, Arc::clone(&config));
    plugin.run_body(&mut builder);
    let PluginBuilder {
        hooks,
        phase_hooks,
        relative,
        shutdown_hooks,
        ..
    } = builder;

    // Validate everything before touching the pipelines.
    for (phase, _) in &phase_hooks {
        if !scope.call_pipeline().contains_phase(phase) {
            return Err(PipelineError::PhaseNotFound(phase.clone()).into());
        }
    }
    let mut resolved = Vec::with_capacity(relative.len());
    for directive in relative {
        let targets = resolve_targets(scope, &directive.targets)?;
        resolved.push((directive, targets));
    }

    if let Some(previous) = scope.registry().installed(id).cloned() {
        let removed = scope.remove_owned(id);
        let dropped_phases = scope.remove_unused_phases(previous.inserted());
        tracing::debug!(
            plugin = id,
            removed,
            dropped_phases,
            "Replacing plugin installed in this scope"
        );
    }

    let mut phases = StagePhases::default();
    register_default(scope.call_pipeline_mut(), Stage::Call, hooks.call, id, &mut phases)?;
    register_default(scope.receive_pipeline_mut(), Stage::Receive, hooks.receive, id, &mut phases)?;
    register_default(scope.send_pipeline_mut(), Stage::Respond, hooks.respond, id, &mut phases)?;
    register_default(
        scope.send_pipeline_mut(),
        Stage::AfterTransform,
        hooks.after_transform,
        id,
        &mut phases,
    )?;

    for (phase, handler) in phase_hooks {
        scope
            .call_pipeline_mut()
            .intercept_shared(&phase, Some(id), handler)?;
        phases.record(Stage::Call, phase);
    }

    let mut inserted = StagePhases::default();
    for (directive, targets) in resolved {
        let RelativeDirective { order, hooks, .. } = directive;
        let call = relative::apply(
            scope.call_pipeline_mut(),
            Stage::Call,
            order,
            &targets,
            hooks.call,
            id,
            &mut phases,
        )?;
        let receive = relative::apply(
            scope.receive_pipeline_mut(),
            Stage::Receive,
            order,
            &targets,
            hooks.receive,
            id,
            &mut phases,
        )?;
        let respond = relative::apply(
            scope.send_pipeline_mut(),
            Stage::Respond,
            order,
            &targets,
            hooks.respond,
            id,
            &mut phases,
        )?;
        let after_transform = relative::apply(
            scope.send_pipeline_mut(),
            Stage::AfterTransform,
            order,
            &targets,
            hooks.after_transform,
            id,
            &mut phases,
        )?;
        for (stage, phase) in [
            (Stage::Call, call),
            (Stage::Receive, receive),
            (Stage::Respond, respond),
            (Stage::AfterTransform, after_transform),
        ] {
            if let Some(phase) = phase {
                inserted.record(stage, phase);
            }
        }
    }

    scope
        .registry_mut()
        .insert(
            InstalledPlugin::new(id, config.clone(), phases)
                .with_inserted(inserted)
                .with_shutdown_hooks(shutdown_hooks),
        );
    metrics::record_plugin_installed(id);
    tracing::debug!(plugin = id, "Plugin installed");
    Ok(config)
}

/// Look up every target in the scope's registry and check that the phases it
/// recorded are still present.
fn resolve_targets(
    scope: &ApplicationCallPipeline,
    targets: &[PluginId],
) -> Result<Vec<Arc<InstalledPlugin>>, PluginError> {
    targets
        .iter()
        .map(|&target| {
            let installed = scope
                .registry()
                .installed(target)
                .cloned()
                .ok_or(PluginError::NotInstalled(target))?;
            sorted_phases(scope.call_pipeline(), Stage::Call, &installed)?;
            sorted_phases(scope.receive_pipeline(), Stage::Receive, &installed)?;
            sorted_phases(scope.send_pipeline(), Stage::Respond, &installed)?;
            sorted_phases(scope.send_pipeline(), Stage::AfterTransform, &installed)?;
            Ok(installed)
        })
        .collect()
}

fn register_default<S>(
    pipeline: &mut Pipeline<S, ApplicationCall>,
    stage: Stage,
    handlers: Vec<Interceptor<S, ApplicationCall>>,
    owner: PluginId,
    recorded: &mut StagePhases,
) -> Result<(), PluginError>
where
    S: Send + 'static,
{
    if handlers.is_empty() {
        return Ok(());
    }
    let phase: Phase = stage.default_phase();
    for handler in handlers {
        pipeline.intercept_shared(&phase, Some(owner), handler)?;
    }
    recorded.record(stage, phase);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::phases;
    use crate::plugin::builder::create_plugin;

    #[derive(Debug, Default)]
    struct Limits {
        max: usize,
    }

    #[test]
    fn test_install_runs_configure_and_registers() {
        let plugin = create_plugin("Limits", Limits::default, |builder| {
            builder.on_call(|ctx| {
                Box::pin(async move {
                    ctx.proceed().await?;
                    Ok(())
                })
            });
        });

        let mut scope = ApplicationCallPipeline::new();
        let config = install(&mut scope, &plugin, |c| c.max = 10).unwrap();
        assert_eq!(config.max, 10);
        assert_eq!(scope.registry().plugin(plugin.key()).unwrap().max, 10);
        assert_eq!(scope.call_pipeline().phase_interceptor_count(&phases::call::PLUGINS), 1);

        let installed = scope.registry().installed("Limits").unwrap();
        assert_eq!(installed.phases().get(Stage::Call), &[phases::call::PLUGINS.clone()]);
    }

    #[test]
    fn test_reinstall_replaces_interceptors() {
        let plugin = create_plugin("Limits", Limits::default, |builder| {
            builder.on_call_respond(|_ctx| Box::pin(async move { Ok(()) }));
        });

        let mut scope = ApplicationCallPipeline::new();
        install(&mut scope, &plugin, |c| c.max = 1).unwrap();
        install(&mut scope, &plugin, |c| c.max = 2).unwrap();

        assert_eq!(scope.send_pipeline().phase_interceptor_count(&phases::send::TRANSFORM), 1);
        assert_eq!(scope.registry().plugin(plugin.key()).unwrap().max, 2);
        assert_eq!(scope.registry().len(), 1);
    }

    #[test]
    fn test_reinstall_drops_unused_relative_phases() {
        let target = create_plugin("Target", Limits::default, |builder| {
            builder.on_call_respond(|_ctx| Box::pin(async move { Ok(()) }));
        });
        let follower = create_plugin("Follower", Limits::default, |builder| {
            builder.after_plugins(["Target"], |hooks| {
                hooks.on_call_respond(|_ctx| Box::pin(async move { Ok(()) }));
            });
        });

        let mut scope = ApplicationCallPipeline::new();
        install(&mut scope, &target, |_| {}).unwrap();
        install(&mut scope, &follower, |_| {}).unwrap();
        let phase_count = scope.send_pipeline().phases().len();
        assert_eq!(phase_count, phases::send::layout().len() + 1);

        install(&mut scope, &follower, |_| {}).unwrap();
        install(&mut scope, &follower, |_| {}).unwrap();
        assert_eq!(scope.send_pipeline().phases().len(), phase_count);
        assert_eq!(scope.send_pipeline().interceptor_count(), 2);
    }

    #[test]
    fn test_shutdown_hooks_recorded_on_install() {
        let plugin = create_plugin("Closer", Limits::default, |builder| {
            builder.on_shutdown(|| {});
            builder.on_shutdown(|| {});
        });

        let mut scope = ApplicationCallPipeline::new();
        install(&mut scope, &plugin, |_| {}).unwrap();
        install(&mut scope, &plugin, |_| {}).unwrap();
        assert_eq!(scope.registry().run_shutdown_hooks(), 2);
    }

    #[test]
    fn test_unknown_call_phase_leaves_scope_untouched() {
        let stray = Phase::new("Stray");
        let plugin = create_plugin("Stray", Limits::default, move |builder| {
            builder.on_call(|_ctx| Box::pin(async move { Ok(()) }));
            builder.on_call_phase(&stray, |_ctx| Box::pin(async move { Ok(()) }));
        });

        let mut scope = ApplicationCallPipeline::new();
        let err = install(&mut scope, &plugin, |_| {}).unwrap_err();
        assert!(matches!(err, PluginError::Pipeline(PipelineError::PhaseNotFound(_))));
        assert!(scope.call_pipeline().is_empty());
        assert!(scope.registry().is_empty());
    }
}
