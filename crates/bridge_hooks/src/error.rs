//! Error types for locating and patching native code.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Invalid signature: {0}")]
    SignatureParse(String),

    #[error("Function not found: {name}")]
    NotFound { name: String },

    #[error("Module not mapped: {0}")]
    ModuleNotFound(String),

    #[error("Cannot change protection at {address:#x}: {source}")]
    Protect {
        address: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Patch length {patch_len} at {address:#x} cannot hold a {needed}-byte redirect")]
    PatchTooShort {
        address: usize,
        patch_len: usize,
        needed: usize,
    },

    #[error("Redirect from {from:#x} to {to:#x} is out of range")]
    OutOfRange { from: usize, to: usize },

    #[error("No hook installed at {0:#x}")]
    NotInstalled(usize),

    #[error("Executable allocation failed: {0}")]
    Mmap(std::io::Error),

    #[error("Cannot release executable block at {address:#x}: {source}")]
    Munmap {
        address: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Memory is read-only at {0:#x}")]
    ReadOnly(usize),

    #[error("Memory access out of bounds at {address:#x} (+{len})")]
    OutOfBounds { address: usize, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
