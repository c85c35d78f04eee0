//! CallLogging: one log line and one metrics sample per call.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use axum::http::StatusCode;

use crate::application::call::ApplicationCall;
use crate::application::phases;
use crate::observability::metrics;
use crate::plugin::{create_plugin, ApplicationPlugin};
use crate::plugins::call_id::call_id;

/// Level the completion line is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
}

#[derive(Debug, Clone)]
pub struct CallLoggingConfig {
    pub level: LogLevel,
    /// Record `phasekit_calls_total` and `phasekit_call_duration_seconds`.
    pub record_metrics: bool,
}

impl Default for CallLoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            record_metrics: true,
        }
    }
}

/// Status reported for a finished call.
fn final_status(call: &ApplicationCall, failed: bool) -> StatusCode {
    if failed && !call.is_responded() {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match call.status() {
        Some(status) => status,
        None if call.is_responded() => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn log_call(level: LogLevel, call: &ApplicationCall, status: StatusCode, started: Instant) {
    let call_id = call_id(call).map(|id| id.to_string()).unwrap_or_default();
    let elapsed_ms = millis(started.elapsed());
    let method = call.method().as_str();
    let path = call.path();
    let status = status.as_u16();
    match level {
        LogLevel::Trace => tracing::trace!(%call_id, method, path, status, elapsed_ms, "Call completed"),
        LogLevel::Debug => tracing::debug!(%call_id, method, path, status, elapsed_ms, "Call completed"),
        LogLevel::Info => tracing::info!(%call_id, method, path, status, elapsed_ms, "Call completed"),
        LogLevel::Warn => tracing::warn!(%call_id, method, path, status, elapsed_ms, "Call completed"),
    }
}

/// Wraps everything after `Monitoring`, so it sees handler failures before
/// the engine turns them into a response.
pub static CALL_LOGGING: LazyLock<ApplicationPlugin<CallLoggingConfig>> = LazyLock::new(|| {
    create_plugin("CallLogging", CallLoggingConfig::default, |plugin| {
        let config = Arc::clone(plugin.plugin_config());

        plugin.on_call_phase(&phases::call::MONITORING, move |ctx| {
            let config = Arc::clone(&config);
            Box::pin(async move {
                let call = ctx.call().clone();
                let started = Instant::now();
                let result = ctx.proceed().await;

                let status = final_status(&call, result.is_err());
                log_call(config.level, &call, status, started);
                if config.record_metrics {
                    metrics::record_call(call.method().as_str(), status.as_u16(), started);
                }
                if let Err(err) = &result {
                    tracing::debug!(call_id = %call.id(), error = %err, "Call failed");
                }
                result.map_err(Into::into)
            })
        });
    })
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{Application, CallRequest, OutgoingContent};
    use axum::http::Method;

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_micros(1_500_900)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    fn call() -> ApplicationCall {
        Application::new().create_call(CallRequest::new(Method::GET, "/".parse().unwrap()))
    }

    #[test]
    fn test_unanswered_call_reports_404() {
        assert_eq!(final_status(&call(), false), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_failed_call_reports_500_unless_responded() {
        let failed = call();
        assert_eq!(final_status(&failed, true), StatusCode::INTERNAL_SERVER_ERROR);

        let responded = call();
        responded.set_status(StatusCode::ACCEPTED);
        responded.commit(OutgoingContent::Empty).unwrap();
        assert_eq!(final_status(&responded, true), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_responded_without_status_is_ok() {
        let call = call();
        call.commit(OutgoingContent::Text("hi".to_string())).unwrap();
        assert_eq!(final_status(&call, false), StatusCode::OK);
    }
}
