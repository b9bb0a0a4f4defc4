//! Lua 5.4 scripting layer for the event bridge.
//!
//! Scripts register handlers through the global `qlbridge` table:
//!
//! ```lua
//! qlbridge.register_handler("player_connect", function(client_id, is_bot)
//!     if client_id == 3 then return false end
//! end)
//! ```

pub mod api;
pub mod convert;
pub mod error;
pub mod host;
pub mod runtime;
pub mod sandbox;

pub use error::ScriptError;
pub use host::{discover_script_files, LoadReport, ScriptHost, ScriptSettings};
pub use runtime::LuaRuntime;
