//! HTTP engine adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, timeout and trace layers)
//!     → request.rs (buffer body, build CallRequest)
//!     → Application::execute (call pipeline, routing, plugins)
//!     → response.rs (CallResponse → engine response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::into_call_request;
pub use response::into_response;
pub use server::{EngineState, HttpServer};
