//! Concurrent executions sharing one pipeline.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use tokio_util::sync::CancellationToken;

use phasekit::application::{phases, Application};
use phasekit::pipeline::{ExecutionError, Phase, Pipeline};

mod common;
use common::request;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_never_share_subjects() {
    let phase = Phase::new("Only");
    let mut pipeline: Pipeline<String, u64> = Pipeline::with_phases([phase.clone()]);
    pipeline
        .intercept(&phase, |ctx| {
            Box::pin(async move {
                let id = *ctx.call();
                ctx.set_subject(format!("call-{id}"));
                tokio::task::yield_now().await;
                ctx.proceed().await?;
                Ok(())
            })
        })
        .unwrap();
    pipeline
        .intercept(&phase, |ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let expected = format!("call-{}", ctx.call());
                assert_eq!(ctx.subject(), &expected);
                Ok(())
            })
        })
        .unwrap();
    let pipeline = Arc::new(pipeline);

    let tasks: Vec<_> = (0..64u64)
        .map(|id| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { (id, pipeline.execute(id, String::new()).await) })
        })
        .collect();

    for task in tasks {
        let (id, result) = task.await.unwrap();
        assert_eq!(result.unwrap(), format!("call-{id}"));
    }
}

#[tokio::test]
async fn test_cancelling_one_execution_leaves_others_running() {
    let phase = Phase::new("Only");
    let mut pipeline: Pipeline<u32, ()> = Pipeline::with_phases([phase.clone()]);
    pipeline
        .intercept(&phase, |ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                *ctx.subject_mut() += 1;
                Ok(())
            })
        })
        .unwrap();
    let pipeline = Arc::new(pipeline);

    let doomed_token = CancellationToken::new();
    let doomed = {
        let pipeline = Arc::clone(&pipeline);
        let token = doomed_token.clone();
        tokio::spawn(async move { pipeline.execute_with_cancellation((), 0, token).await })
    };
    let survivor = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move {
            pipeline
                .execute_with_cancellation((), 10, CancellationToken::new())
                .await
        })
    };

    doomed_token.cancel();
    assert!(matches!(doomed.await.unwrap(), Err(ExecutionError::Cancelled)));
    assert_eq!(survivor.await.unwrap().unwrap(), 11);
}

#[tokio::test]
async fn test_application_calls_keep_their_own_state() {
    let mut app = Application::new();
    app.pipeline_mut()
        .call_pipeline_mut()
        .intercept(&phases::call::CALL, |ctx| {
            Box::pin(async move {
                let call = ctx.call().clone();
                let path = call.path().to_string();
                tokio::task::yield_now().await;
                call.respond(path).await?;
                Ok(())
            })
        })
        .unwrap();
    let app = Arc::new(app);

    let tasks: Vec<_> = (0..32)
        .map(|n| {
            let app = Arc::clone(&app);
            tokio::spawn(async move {
                let call = app.create_call(request(Method::GET, &format!("/item/{n}")));
                app.execute(&call).await.unwrap();
                (n, call.response_snapshot())
            })
        })
        .collect();

    for task in tasks {
        let (n, response) = task.await.unwrap();
        assert!(response.committed);
        assert_eq!(&response.body[..], format!("/item/{n}").as_bytes());
    }
}

#[tokio::test]
async fn test_call_token_cancels_nested_respond() {
    let mut app = Application::new();
    app.pipeline_mut()
        .send_pipeline_mut()
        .intercept(&phases::send::TRANSFORM, |ctx| {
            Box::pin(async move {
                ctx.call().cancellation().cancel();
                ctx.proceed().await?;
                Ok(())
            })
        })
        .unwrap();

    let call = app.create_call(request(Method::GET, "/"));
    let err = call.respond("never").await.unwrap_err();
    assert!(matches!(
        err,
        phasekit::application::CallError::Execution(ExecutionError::Cancelled)
    ));
    assert!(!call.is_responded());
}
