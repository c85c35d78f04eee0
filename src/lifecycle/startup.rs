//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the built-in plugins selected by configuration, in a fixed order
//!
//! # Design Decisions
//! - DefaultHeaders and CallId go first so every later hook sees their effects
//! - StatusPages is always installed; the engine adapter relies on it for
//!   rendering handler failures

use axum::http::StatusCode;

use crate::application::Application;
use crate::config::schema::PluginsConfig;
use crate::plugin::PluginError;
use crate::plugins::{CALL_ID, CALL_LOGGING, DEFAULT_HEADERS, STATUS_PAGES};

/// Install the built-in plugins configured in `[plugins]`.
pub fn install_default_plugins(
    application: &mut Application,
    config: &PluginsConfig,
) -> Result<(), PluginError> {
    application.install(&DEFAULT_HEADERS, |headers| {
        for (name, value) in &config.default_headers {
            headers.header(name.clone(), value.clone());
        }
    })?;

    if !config.call_id_header.is_empty() {
        application.install(&CALL_ID, |call_id| {
            call_id.header = config.call_id_header.clone();
        })?;
    }

    if config.call_logging {
        application.install(&CALL_LOGGING, |_| {})?;
    }

    application.install(&STATUS_PAGES, |pages| {
        pages
            .status(StatusCode::NOT_FOUND, "Not Found")
            .status(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    })?;

    tracing::info!(plugins = ?application.pipeline().registry().ids(), "Default plugins installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installs_configured_plugins() {
        let mut app = Application::new();
        install_default_plugins(&mut app, &PluginsConfig::default()).unwrap();
        let registry = app.pipeline().registry();
        for id in ["DefaultHeaders", "CallId", "CallLogging", "StatusPages"] {
            assert!(registry.contains(id), "{id} missing");
        }
    }

    #[test]
    fn test_disabled_plugins_are_skipped() {
        let mut app = Application::new();
        let config = PluginsConfig {
            call_id_header: String::new(),
            call_logging: false,
            ..PluginsConfig::default()
        };
        install_default_plugins(&mut app, &config).unwrap();
        let registry = app.pipeline().registry();
        assert!(!registry.contains("CallId"));
        assert!(!registry.contains("CallLogging"));
        assert!(registry.contains("StatusPages"));
    }
}
