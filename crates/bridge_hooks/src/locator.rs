//! Resolution of logical function names to call addresses.
//!
//! A signature scan of the owning module is tried first. When it misses, the
//! static offset table for the detected build is consulted. A function that
//! resolves neither way is reported and left out; everything depending on it
//! simply never fires.

use crate::build_id::BuildId;
use crate::error::HookError;
use crate::maps::ModuleDescriptor;
use crate::scanner;
use crate::signature::Signature;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info};

/// A function the bridge wants to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: &'static str,
    /// Byte signature, or `None` for functions only reachable by offset.
    pub pattern: Option<&'static str>,
    /// Instruction-aligned prologue span replaced by an inline hook.
    pub patch_len: usize,
}

/// Per-build fallback offsets, relative to the image base.
///
/// ```toml
/// [hooks.offsets."a9993e364706816aba3e25717850c26c9cd0d89d"]
/// SV_ClientThink = 0x7a5d0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OffsetTable(HashMap<String, HashMap<String, u64>>);

impl OffsetTable {
    pub fn with_offset(mut self, build: &BuildId, name: &str, offset: u64) -> Self {
        self.0
            .entry(build.as_str().to_string())
            .or_default()
            .insert(name.to_string(), offset);
        self
    }

    pub fn lookup(&self, build: &BuildId, name: &str) -> Option<u64> {
        self.0.get(build.as_str())?.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    Signature,
    Offset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub name: &'static str,
    pub address: usize,
    pub patch_len: usize,
    pub by: ResolvedBy,
}

/// Outcome of resolving a whole function table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedTable {
    pub resolved: BTreeMap<&'static str, Resolution>,
    pub missing: Vec<&'static str>,
}

impl ResolvedTable {
    pub fn get(&self, name: &str) -> Option<&Resolution> {
        self.resolved.get(name)
    }

    pub fn address(&self, name: &str) -> Option<usize> {
        self.get(name).map(|r| r.address)
    }
}

pub struct FunctionLocator<'a> {
    module: &'a ModuleDescriptor,
    /// The bytes of `module.base .. module.base + module.size`.
    code: &'a [u8],
    build: Option<&'a BuildId>,
    offsets: &'a OffsetTable,
}

impl<'a> FunctionLocator<'a> {
    pub fn new(
        module: &'a ModuleDescriptor,
        code: &'a [u8],
        build: Option<&'a BuildId>,
        offsets: &'a OffsetTable,
    ) -> Self {
        Self {
            module,
            code,
            build,
            offsets,
        }
    }

    pub fn locate(&self, spec: &FunctionSpec) -> Result<Resolution, HookError> {
        if let Some(pattern) = spec.pattern {
            match Signature::parse(pattern) {
                Ok(signature) => {
                    if let Some(address) = scanner::find(self.module.base, self.code, &signature) {
                        return Ok(Resolution {
                            name: spec.name,
                            address,
                            patch_len: spec.patch_len,
                            by: ResolvedBy::Signature,
                        });
                    }
                    debug!("Signature for {} not found, trying offset table", spec.name);
                }
                Err(e) => error!("❌ Bad signature for {}: {}", spec.name, e),
            }
        }

        let offset = self
            .build
            .and_then(|build| self.offsets.lookup(build, spec.name))
            .ok_or_else(|| HookError::NotFound {
                name: spec.name.to_string(),
            })?;

        Ok(Resolution {
            name: spec.name,
            address: self.module.image_base + offset as usize,
            patch_len: spec.patch_len,
            by: ResolvedBy::Offset,
        })
    }

    /// Resolves every spec, collecting the names that could not be found.
    ///
    /// Each function is tried by signature first and then through the
    /// offset table for this module's build. A failure is logged and
    /// recorded in [`ResolvedTable::missing`]; it never stops the others.
    pub fn locate_all(&self, specs: &[FunctionSpec]) -> ResolvedTable {
        let mut table = ResolvedTable::default();
        for spec in specs {
            match self.locate(spec) {
                Ok(resolution) => {
                    info!(
                        "📍 {} at {:#x} ({:?})",
                        resolution.name, resolution.address, resolution.by
                    );
                    table.resolved.insert(spec.name, resolution);
                }
                Err(e) => {
                    error!("❌ Unable to resolve {}: {}", spec.name, e);
                    table.missing.push(spec.name);
                }
            }
        }
        table
    }
}
