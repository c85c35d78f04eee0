//! Built-in plugins.
//!
//! | Plugin | Hooks |
//! |--------|-------|
//! | `CallId` | call phase `Setup` |
//! | `CallLogging` | call phase `Monitoring` |
//! | `StatusPages` | `on_call`, `on_call_respond` |
//! | `DefaultHeaders` | `on_call_respond` |

pub mod call_id;
pub mod call_logging;
pub mod default_headers;
pub mod status_pages;

pub use call_id::{call_id, CallIdConfig, CALL_ID, CALL_ID_ATTRIBUTE, X_REQUEST_ID};
pub use call_logging::{CallLoggingConfig, LogLevel, CALL_LOGGING};
pub use default_headers::{DefaultHeadersConfig, DEFAULT_HEADERS};
pub use status_pages::{StatusPagesConfig, STATUS_PAGES};
