//! StatusPages: turn handler failures and bare status responses into pages.
//!
//! # Responsibilities
//! - Catch errors raised below the `Plugins` phase and respond with a
//!   rendered page instead of failing the call
//! - Replace `OutgoingContent::Status` responses with a configured body
//!
//! # Design Decisions
//! - Cancellation is never rendered; it propagates to the engine
//! - A failure after the response was committed is re-raised unchanged

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, LazyLock};

use axum::http::StatusCode;

use crate::application::call::{ApplicationCall, CallError};
use crate::application::content::OutgoingContent;
use crate::pipeline::ExecutionError;
use crate::plugin::{create_plugin, ApplicationPlugin};

type ExceptionHandler =
    Arc<dyn Fn(&(dyn StdError + Send + Sync + 'static)) -> Option<(StatusCode, String)> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StatusPagesConfig {
    exceptions: Vec<ExceptionHandler>,
    statuses: HashMap<StatusCode, String>,
}

impl StatusPagesConfig {
    /// Render errors of type `E` with `status` and the body `render` returns.
    ///
    /// Handlers are tried in registration order.
    pub fn exception<E, F>(&mut self, status: StatusCode, render: F) -> &mut Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> String + Send + Sync + 'static,
    {
        self.exceptions.push(Arc::new(move |err: &(dyn StdError + Send + Sync + 'static)| {
            err.downcast_ref::<E>().map(|e| (status, render(e)))
        }));
        self
    }

    /// Body sent when a handler responds with a bare `status`.
    pub fn status(&mut self, status: StatusCode, body: impl Into<String>) -> &mut Self {
        self.statuses.insert(status, body.into());
        self
    }

    fn render(&self, err: &ExecutionError) -> (StatusCode, String) {
        if let ExecutionError::Interceptor(source) = err {
            for handler in &self.exceptions {
                if let Some(page) = handler(&**source) {
                    return page;
                }
            }
        }
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let body = self
            .statuses
            .get(&status)
            .cloned()
            .unwrap_or_else(|| "Internal Server Error".to_string());
        (status, body)
    }
}

impl fmt::Debug for StatusPagesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusPagesConfig")
            .field("exceptions", &self.exceptions.len())
            .field("statuses", &self.statuses)
            .finish()
    }
}

fn is_cancellation(call: &ApplicationCall, err: &ExecutionError) -> bool {
    err.is_cancelled()
        || call.cancellation().is_cancelled()
        || matches!(
            err.downcast_ref::<CallError>(),
            Some(CallError::Execution(ExecutionError::Cancelled))
        )
}

pub static STATUS_PAGES: LazyLock<ApplicationPlugin<StatusPagesConfig>> = LazyLock::new(|| {
    create_plugin("StatusPages", StatusPagesConfig::default, |plugin| {
        let config = Arc::clone(plugin.plugin_config());

        let on_error = Arc::clone(&config);
        plugin.on_call(move |ctx| {
            let config = Arc::clone(&on_error);
            Box::pin(async move {
                let call = ctx.call().clone();
                let err = match ctx.proceed().await {
                    Ok(()) => return Ok(()),
                    Err(err) => err,
                };
                if is_cancellation(&call, &err) || call.is_responded() {
                    return Err(err.into());
                }

                let (status, body) = config.render(&err);
                tracing::warn!(call_id = %call.id(), error = %err, status = status.as_u16(), "Rendering error page");
                call.set_status(status);
                call.respond(body).await?;
                Ok(())
            })
        });

        plugin.on_call_respond(move |ctx| {
            let config = Arc::clone(&config);
            Box::pin(async move {
                let status = match ctx.subject() {
                    OutgoingContent::Status(status) => *status,
                    _ => return Ok(()),
                };
                if let Some(body) = config.statuses.get(&status) {
                    ctx.call().set_status(status);
                    ctx.set_subject(OutgoingContent::Text(body.clone()));
                }
                Ok(())
            })
        });
    })
});
