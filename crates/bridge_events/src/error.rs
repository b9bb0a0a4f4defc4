//! Error types for the dispatch bridge.

use crate::kind::EventKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    /// No event kind carries this scripting-layer name
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    /// The handler raised or could not be called
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
    /// The handler returned a value of the wrong shape
    #[error("Malformed result from {kind} handler: {reason}")]
    MalformedResult { kind: EventKind, reason: String },
    /// The scripting runtime itself failed
    #[error("Runtime error: {0}")]
    RuntimeError(String),
    /// Exclusive runtime access was requested from inside a dispatch
    #[error("Scripting runtime is already in use on this thread")]
    Reentrant,
}
