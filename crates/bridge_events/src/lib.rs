//! Event dispatch between hooked engine functions and the scripting layer.
//!
//! A stub builds an [`EventCall`], hands it to an [`EventBridge`] and gets a
//! [`Verdict`] back. The bridge owns the [`HandlerRegistry`], serializes
//! interpreter access through an [`InterpreterLock`] and applies the
//! per-kind [`Capabilities`] table in one place.

pub mod bridge;
pub mod call;
pub mod diagnostics;
pub mod error;
pub mod kind;
pub mod queryable;
pub mod registry;
pub mod stats;
pub mod think;
pub mod token;
pub mod value;
pub mod verdict;

pub use bridge::{BridgeSettings, Dispatcher, EventBridge, ScriptRuntime, DEFAULT_MAX_TEXT_LEN};
pub use call::{EventArg, EventCall};
pub use diagnostics::{format_line, CollectingSink, DiagnosticSink, TracingSink, DIAGNOSTIC_PREFIX};
pub use error::EventError;
pub use kind::{Capabilities, EventKind, ReplaceShape};
pub use queryable::{QueryWindow, QueryableClient};
pub use registry::HandlerRegistry;
pub use stats::DispatchStats;
pub use think::ThinkInput;
pub use token::{AccessToken, InterpreterLock};
pub use value::ScriptValue;
pub use verdict::{interpret, truncate_text, Fault, Interpretation, Replacement, Verdict};
