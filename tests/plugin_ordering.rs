//! Relative ordering between plugins.

use axum::http::Method;

use phasekit::application::{phases, Application, ApplicationCall, OutgoingContent, ReceiveRequest};
use phasekit::pipeline::Interceptor;
use phasekit::plugin::{create_plugin, ApplicationPlugin, PluginError, RelativeOrder, Stage, StageHooks};

mod common;
use common::{record, request, run_call, EventLog};

/// `F`: logs "F" while responding, on the default respond phase.
fn plugin_f() -> ApplicationPlugin<EventLog> {
    create_plugin("F", EventLog::new, |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        plugin.on_call_respond(move |_ctx| {
            let log = log.clone();
            Box::pin(async move {
                log.push("F");
                Ok(())
            })
        });
    })
}

/// `G`: logs "G" while responding, placed relative to `F`.
fn plugin_g(before: bool) -> ApplicationPlugin<EventLog> {
    create_plugin("G", EventLog::new, move |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        let register = move |hooks: &mut phasekit::plugin::StageHooks| {
            hooks.on_call_respond(move |_ctx| {
                let log = log.clone();
                Box::pin(async move {
                    log.push("G");
                    Ok(())
                })
            });
        };
        if before {
            plugin.before_plugins(["F"], register);
        } else {
            plugin.after_plugins(["F"], register);
        }
    })
}

async fn respond_once(app: &Application) {
    let call = app.create_call(request(Method::GET, "/"));
    call.respond("body").await.unwrap();
}

#[tokio::test]
async fn test_before_plugins_runs_first() {
    let log = EventLog::new();
    let mut app = Application::new();
    let shared = log.clone();
    app.install(&plugin_f(), |config| *config = shared.clone()).unwrap();
    let shared = log.clone();
    app.install(&plugin_g(true), |config| *config = shared.clone()).unwrap();

    for _ in 0..3 {
        log.clear();
        respond_once(&app).await;
        assert_eq!(log.events(), vec!["G", "F"]);
    }
}

#[tokio::test]
async fn test_after_plugins_runs_last() {
    let log = EventLog::new();
    let mut app = Application::new();
    let shared = log.clone();
    app.install(&plugin_f(), |config| *config = shared.clone()).unwrap();
    let shared = log.clone();
    app.install(&plugin_g(false), |config| *config = shared.clone()).unwrap();

    respond_once(&app).await;
    assert_eq!(log.events(), vec!["F", "G"]);
}

#[tokio::test]
async fn test_relative_phase_is_new_and_adjacent() {
    let mut app = Application::new();
    app.install(&plugin_f(), |_| {}).unwrap();
    app.install(&plugin_g(true), |_| {}).unwrap();

    let registry = app.pipeline().registry();
    let f_phase = registry.installed("F").unwrap().phases().get(Stage::Respond)[0].clone();
    let g_phase = registry.installed("G").unwrap().phases().get(Stage::Respond)[0].clone();
    assert_eq!(f_phase, *phases::send::TRANSFORM);
    assert_ne!(g_phase, f_phase);
    assert!(g_phase.name().starts_with("GPhase"));

    let send = app.pipeline().send_pipeline();
    assert_eq!(send.index_of(&g_phase).unwrap() + 1, send.index_of(&f_phase).unwrap());
}

#[test]
fn test_missing_target_fails_naming_it() {
    let mut app = Application::new();
    let err = app.install(&plugin_g(true), |_| {}).unwrap_err();
    assert_eq!(err, PluginError::NotInstalled("F"));
    assert!(err.to_string().contains("`F`"));

    // Nothing was registered by the failed install.
    assert!(!app.pipeline().registry().contains("G"));
    assert_eq!(app.pipeline().send_pipeline().interceptor_count(), 0);
}

#[tokio::test]
async fn test_stage_without_target_phases_uses_default_phase() {
    let log = EventLog::new();
    let shared = log.clone();
    let h = create_plugin("H", move || shared.clone(), |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        plugin.before_plugins(["F"], move |hooks| {
            hooks.on_call(move |ctx| {
                let log = log.clone();
                Box::pin(async move {
                    log.push("H");
                    ctx.proceed().await?;
                    Ok(())
                })
            });
        });
    });

    let mut app = Application::new();
    app.install(&plugin_f(), |_| {}).unwrap();
    app.install(&h, |_| {}).unwrap();

    let installed = app.pipeline().registry().installed("H").unwrap().clone();
    assert_eq!(installed.phases().get(Stage::Call), &[phases::call::PLUGINS.clone()]);

    run_call(&app, request(Method::GET, "/")).await;
    assert_eq!(log.events(), vec!["H"]);
}

#[tokio::test]
async fn test_multiple_targets_ordered_against_all() {
    let log = EventLog::new();
    let mut app = Application::new();
    let shared = log.clone();
    app.install(&logging_plugin("A"), |config| *config = shared.clone()).unwrap();
    let shared = log.clone();
    // B after A.
    let b_after_a = create_plugin("B", EventLog::new, |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        plugin.after_plugins(["A"], move |hooks| {
            hooks.on_call_respond(move |_ctx| {
                let log = log.clone();
                Box::pin(async move {
                    log.push("B");
                    Ok(())
                })
            });
        });
    });
    app.install(&b_after_a, |config| *config = shared.clone()).unwrap();

    let shared = log.clone();
    let first = create_plugin("First", EventLog::new, |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        plugin.before_plugins(["B", "A"], move |hooks| {
            hooks.on_call_respond(move |_ctx| {
                let log = log.clone();
                Box::pin(async move {
                    log.push("First");
                    Ok(())
                })
            });
        });
    });
    app.install(&first, |config| *config = shared.clone()).unwrap();

    let shared = log.clone();
    let last = create_plugin("Last", EventLog::new, |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        plugin.after_plugins(["A", "B"], move |hooks| {
            hooks.on_call_respond(move |_ctx| {
                let log = log.clone();
                Box::pin(async move {
                    log.push("Last");
                    Ok(())
                })
            });
        });
    });
    app.install(&last, |config| *config = shared.clone()).unwrap();

    respond_once(&app).await;
    assert_eq!(log.events(), vec!["First", "A", "B", "Last"]);
}

fn logging_plugin(id: &'static str) -> ApplicationPlugin<EventLog> {
    create_plugin(id, EventLog::new, move |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        plugin.on_call_respond(move |_ctx| {
            let log = log.clone();
            Box::pin(async move {
                log.push(id);
                Ok(())
            })
        });
    })
}

#[tokio::test]
async fn test_reinstall_replaces_previous_hooks() {
    let log = EventLog::new();
    let mut app = Application::new();
    let shared = log.clone();
    app.install(&plugin_f(), |config| *config = shared.clone()).unwrap();
    let shared = log.clone();
    app.install(&plugin_f(), |config| *config = shared.clone()).unwrap();

    respond_once(&app).await;
    assert_eq!(log.events(), vec!["F"]);
}

#[test]
fn test_unknown_call_phase_fails_install() {
    let stray = phasekit::Phase::new("Stray");
    let plugin = create_plugin("Stray", || (), move |plugin| {
        plugin.on_call_phase(&stray, |ctx| Box::pin(async move { ctx.proceed().await.map_err(Into::into) }));
    });
    let mut app = Application::new();
    assert!(matches!(
        app.install(&plugin, |_| {}),
        Err(PluginError::Pipeline(_))
    ));
    assert!(!app.pipeline().registry().contains("Stray"));
}

/// `F` for the receive or after-transform stage, on its default phase.
fn stage_target(stage: Stage) -> ApplicationPlugin<EventLog> {
    create_plugin("F", EventLog::new, move |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        match stage {
            Stage::Receive => {
                let hook: Interceptor<ReceiveRequest, ApplicationCall> = record(&log, "F");
                plugin.on_call_receive(move |ctx| hook(ctx));
            }
            Stage::AfterTransform => {
                let hook: Interceptor<OutgoingContent, ApplicationCall> = record(&log, "F");
                plugin.after_transform(move |ctx| hook(ctx));
            }
            other => panic!("no target hook for {other:?}"),
        }
    })
}

/// `G` on the same stage as [`stage_target`], placed relative to `F`.
fn stage_follower(stage: Stage, order: RelativeOrder) -> ApplicationPlugin<EventLog> {
    create_plugin("G", EventLog::new, move |plugin| {
        let log = plugin.plugin_config().as_ref().clone();
        let register = move |hooks: &mut StageHooks| match stage {
            Stage::Receive => {
                let hook: Interceptor<ReceiveRequest, ApplicationCall> = record(&log, "G");
                hooks.on_call_receive(move |ctx| hook(ctx));
            }
            Stage::AfterTransform => {
                let hook: Interceptor<OutgoingContent, ApplicationCall> = record(&log, "G");
                hooks.after_transform(move |ctx| hook(ctx));
            }
            other => panic!("no follower hook for {other:?}"),
        };
        match order {
            RelativeOrder::Before => plugin.before_plugins(["F"], register),
            RelativeOrder::After => plugin.after_plugins(["F"], register),
        }
    })
}

/// Install `F` and `G` for `stage`, drive one call through it and return the log.
async fn stage_order(stage: Stage, order: RelativeOrder) -> Vec<String> {
    let log = EventLog::new();
    let mut app = Application::new();
    let shared = log.clone();
    app.install(&stage_target(stage), |config| *config = shared.clone()).unwrap();
    let shared = log.clone();
    app.install(&stage_follower(stage, order), |config| *config = shared.clone())
        .unwrap();

    let g_phase = app.pipeline().registry().installed("G").unwrap().phases().get(stage)[0].clone();
    assert!(g_phase.name().starts_with("GPhase"));

    let call = app.create_call(request(Method::POST, "/"));
    match stage {
        Stage::Receive => {
            assert!(app.pipeline().receive_pipeline().contains_phase(&g_phase));
            call.receive_text().await.unwrap();
        }
        _ => {
            assert!(app.pipeline().send_pipeline().contains_phase(&g_phase));
            call.respond("body").await.unwrap();
        }
    }
    log.events()
}

#[tokio::test]
async fn test_relative_ordering_on_receive() {
    assert_eq!(stage_order(Stage::Receive, RelativeOrder::Before).await, vec!["G", "F"]);
    assert_eq!(stage_order(Stage::Receive, RelativeOrder::After).await, vec!["F", "G"]);
}

#[tokio::test]
async fn test_relative_ordering_after_transform() {
    assert_eq!(
        stage_order(Stage::AfterTransform, RelativeOrder::Before).await,
        vec!["G", "F"]
    );
    assert_eq!(
        stage_order(Stage::AfterTransform, RelativeOrder::After).await,
        vec!["F", "G"]
    );
}
