//! Metrics collection and exposition.
//!
//! # Metrics
//! - `phasekit_calls_total` (counter): calls by method and status
//! - `phasekit_call_duration_seconds` (histogram): call latency
//! - `phasekit_call_failures_total` (counter): calls whose pipeline failed, by kind
//! - `phasekit_plugins_installed_total` (counter): installs by plugin

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a finished call.
pub fn record_call(method: &str, status: u16, started: Instant) {
    let status = status.to_string();
    metrics::counter!(
        "phasekit_calls_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    metrics::histogram!(
        "phasekit_call_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(started.elapsed().as_secs_f64());
}

/// Record a call whose pipeline ended in an error.
pub fn record_call_failure(kind: &'static str) {
    metrics::counter!("phasekit_call_failures_total", "kind" => kind).increment(1);
}

/// Record a plugin install.
pub fn record_plugin_installed(plugin: &'static str) {
    metrics::counter!("phasekit_plugins_installed_total", "plugin" => plugin).increment(1);
}
