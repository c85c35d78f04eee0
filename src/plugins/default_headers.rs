//! DefaultHeaders: add fixed headers to every response.

use std::sync::{Arc, LazyLock};

use axum::http::{HeaderName, HeaderValue};

use crate::plugin::{create_plugin, ApplicationPlugin};

#[derive(Debug, Clone)]
pub struct DefaultHeadersConfig {
    headers: Vec<(String, String)>,
}

impl DefaultHeadersConfig {
    /// Add a header. Later values for the same name are added as well.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

impl Default for DefaultHeadersConfig {
    fn default() -> Self {
        Self {
            headers: vec![(
                "server".to_string(),
                concat!("phasekit/", env!("CARGO_PKG_VERSION")).to_string(),
            )],
        }
    }
}

/// Headers already set by the handler are left alone.
pub static DEFAULT_HEADERS: LazyLock<ApplicationPlugin<DefaultHeadersConfig>> = LazyLock::new(|| {
    create_plugin("DefaultHeaders", DefaultHeadersConfig::default, |plugin| {
        let headers: Arc<Vec<(HeaderName, HeaderValue)>> = Arc::new(
            plugin
                .plugin_config()
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                        (Ok(name), Ok(value)) => Some((name, value)),
                        _ => {
                            tracing::warn!(header = %name, "Skipping invalid default header");
                            None
                        }
                    }
                })
                .collect(),
        );

        plugin.on_call_respond(move |ctx| {
            let headers = Arc::clone(&headers);
            Box::pin(async move {
                let call = ctx.call();
                for (name, value) in headers.iter() {
                    if call.response_header(name.as_str()).is_none() {
                        call.set_response_header(name.clone(), value.clone());
                    }
                }
                Ok(())
            })
        });
    })
});
