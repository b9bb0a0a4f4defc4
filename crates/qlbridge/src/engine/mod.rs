//! What the bridge knows about the closed engine binary: data layouts,
//! function signatures and the game module's call table.

pub mod functions;
pub mod types;
pub mod vm;
