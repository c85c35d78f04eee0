//! CallId: correlate a call with an id taken from the request or generated.

use std::sync::{Arc, LazyLock};

use axum::http::{HeaderName, HeaderValue};

use crate::application::call::ApplicationCall;
use crate::application::phases;
use crate::attributes::AttributeKey;
use crate::plugin::{create_plugin, ApplicationPlugin};

/// Default header carrying the call id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Call id chosen for the call.
pub const CALL_ID_ATTRIBUTE: AttributeKey<String> = AttributeKey::new("CallId");

#[derive(Debug, Clone)]
pub struct CallIdConfig {
    /// Header the id is read from and echoed into.
    pub header: String,
    /// Generate an id when the request carries none.
    pub generate: bool,
    /// Echo the id on the response.
    pub reply: bool,
}

impl Default for CallIdConfig {
    fn default() -> Self {
        Self {
            header: X_REQUEST_ID.to_string(),
            generate: true,
            reply: true,
        }
    }
}

/// Runs on the `Setup` phase so every later interceptor sees the id.
pub static CALL_ID: LazyLock<ApplicationPlugin<CallIdConfig>> = LazyLock::new(|| {
    create_plugin("CallId", CallIdConfig::default, |plugin| {
        let config = Arc::clone(plugin.plugin_config());
        let header = HeaderName::from_bytes(config.header.as_bytes()).unwrap_or_else(|_| {
            tracing::warn!(header = %config.header, "Invalid call id header, using x-request-id");
            HeaderName::from_static(X_REQUEST_ID)
        });

        plugin.on_call_phase(&phases::call::SETUP, move |ctx| {
            let config = Arc::clone(&config);
            let header = header.clone();
            Box::pin(async move {
                let call = ctx.call();
                let id = call
                    .request_header(header.as_str())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .or_else(|| config.generate.then(|| call.id().to_string()));

                if let Some(id) = id {
                    if config.reply {
                        if let Ok(value) = HeaderValue::from_str(&id) {
                            call.set_response_header(header, value);
                        }
                    }
                    call.attributes().put(&CALL_ID_ATTRIBUTE, id);
                }
                Ok(())
            })
        });
    })
});

/// Id chosen by CallId, if installed.
pub fn call_id(call: &ApplicationCall) -> Option<Arc<String>> {
    call.attributes().get(&CALL_ID_ATTRIBUTE)
}
