//! Error types for the injected library.

use bridge_events::EventError;
use bridge_hooks::HookError;
use script_runtime::ScriptError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Bridge is not initialized")]
    NotInitialized,
}
