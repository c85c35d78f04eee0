//! Well-known phases of the call, receive and send pipelines.
//!
//! Phases are process-wide so every pipeline built from these layouts shares
//! the same identities, which is what lets route pipelines merge cleanly.

use std::sync::LazyLock;

use crate::pipeline::Phase;

/// Call pipeline phases.
pub mod call {
    use super::*;

    /// Prepares the call and its attributes.
    pub static SETUP: LazyLock<Phase> = LazyLock::new(|| Phase::new("Setup"));
    /// Tracing, logging and metrics wrap the rest of the call here.
    pub static MONITORING: LazyLock<Phase> = LazyLock::new(|| Phase::new("Monitoring"));
    /// Default phase for plugin `on_call` handlers.
    pub static PLUGINS: LazyLock<Phase> = LazyLock::new(|| Phase::new("Plugins"));
    /// Routing and handlers.
    pub static CALL: LazyLock<Phase> = LazyLock::new(|| Phase::new("Call"));
    /// Runs when nothing handled the call.
    pub static FALLBACK: LazyLock<Phase> = LazyLock::new(|| Phase::new("Fallback"));

    pub fn layout() -> Vec<Phase> {
        vec![
            SETUP.clone(),
            MONITORING.clone(),
            PLUGINS.clone(),
            CALL.clone(),
            FALLBACK.clone(),
        ]
    }
}

/// Receive pipeline phases.
pub mod receive {
    use super::*;

    pub static BEFORE: LazyLock<Phase> = LazyLock::new(|| Phase::new("Before"));
    /// Default phase for plugin `on_call_receive` handlers.
    pub static TRANSFORM: LazyLock<Phase> = LazyLock::new(|| Phase::new("Transform"));
    pub static AFTER: LazyLock<Phase> = LazyLock::new(|| Phase::new("After"));

    pub fn layout() -> Vec<Phase> {
        vec![BEFORE.clone(), TRANSFORM.clone(), AFTER.clone()]
    }
}

/// Send pipeline phases.
pub mod send {
    use super::*;

    pub static BEFORE: LazyLock<Phase> = LazyLock::new(|| Phase::new("Before"));
    /// Default phase for plugin `on_call_respond` handlers.
    pub static TRANSFORM: LazyLock<Phase> = LazyLock::new(|| Phase::new("Transform"));
    pub static RENDER: LazyLock<Phase> = LazyLock::new(|| Phase::new("Render"));
    pub static CONTENT_ENCODING: LazyLock<Phase> = LazyLock::new(|| Phase::new("ContentEncoding"));
    pub static TRANSFER_ENCODING: LazyLock<Phase> = LazyLock::new(|| Phase::new("TransferEncoding"));
    /// Default phase for plugin `after_transform` handlers.
    pub static AFTER: LazyLock<Phase> = LazyLock::new(|| Phase::new("After"));
    /// Last chance before the engine writes the response.
    pub static ENGINE: LazyLock<Phase> = LazyLock::new(|| Phase::new("Engine"));

    pub fn layout() -> Vec<Phase> {
        vec![
            BEFORE.clone(),
            TRANSFORM.clone(),
            RENDER.clone(),
            CONTENT_ENCODING.clone(),
            TRANSFER_ENCODING.clone(),
            AFTER.clone(),
            ENGINE.clone(),
        ]
    }
}
