//! Late binding to an externally versioned native ABI.
//!
//! Nothing in the hooked binary exports symbols, so every integration point is
//! found at runtime: the [`scanner`] walks a module's executable range for a
//! [`Signature`], the [`locator`] falls back to a per-build [`OffsetTable`]
//! when a scan misses, and the [`installer`] rewrites the located entry point
//! (or a slot in a pointer table) so control lands in interception code.
//!
//! All version-specific knowledge is data: signatures, patch lengths and
//! offsets. Supporting a new binary build means new data, not new logic.

pub mod build_id;
pub mod error;
pub mod installer;
pub mod jump;
pub mod locator;
pub mod maps;
pub mod memory;
pub mod scanner;
pub mod signature;

pub use build_id::BuildId;
pub use error::HookError;
pub use installer::{HookInstaller, HookKind, HookRecord};
pub use locator::{FunctionLocator, FunctionSpec, OffsetTable, Resolution, ResolvedBy, ResolvedTable};
pub use maps::{MapRegion, ModuleDescriptor};
pub use memory::{BufferMemory, CodeMemory, ProcessMemory};
pub use signature::Signature;
