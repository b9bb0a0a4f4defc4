//! Error types for the scripting runtime.

use bridge_events::EventError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Event bridge error: {0}")]
    Event(#[from] EventError),
}
