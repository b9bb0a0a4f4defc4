//! # qlbridge
//!
//! A shared library preloaded into the Quake Live dedicated server. It hooks
//! engine and game-module functions at runtime and forwards what they see to
//! Lua scripts, which can pass, block or rewrite each event.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the server with the bridge preloaded
//! LD_PRELOAD=./libqlbridge.so ./qzeroded.x64 +set fs_homepath ~/ql
//!
//! # Use a configuration file other than ./qlbridge.toml
//! QLBRIDGE_CONFIG=/etc/qlbridge.toml LD_PRELOAD=./libqlbridge.so ./qzeroded.x64
//!
//! # Check the signatures against a new server build
//! sigcheck --image ./qzeroded.x64 --module engine
//! ```
//!
//! ## Layout
//!
//! * [`engine`]: data layouts, function signatures and the VM call table
//! * [`stubs`]: the `extern "C"` interception stubs and their verdict logic
//! * [`app`]: the load sequence driven by the engine's own calls
//! * [`config`] / [`logging`]: the TOML configuration and `tracing` setup
//! * [`sigcheck`]: the offline signature checker behind the `sigcheck` binary

pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod sigcheck;
pub mod stubs;

pub use config::BridgeConfig;
pub use error::BridgeError;

/// Runs when the dynamic loader maps the library, before the server's
/// `main`. Outside the configured server process it does nothing.
#[ctor::ctor]
fn on_load() {
    app::on_library_load();
}
