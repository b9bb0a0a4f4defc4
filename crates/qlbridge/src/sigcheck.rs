//! Offline signature checking against a server binary on disk.
//!
//! The file is scanned as a flat image whose base is zero, so every
//! reported address is a file offset. For the server's text segment that is
//! also the offset from the image base, the unit the offset table uses.

use crate::engine::functions::{ENGINE_FUNCTIONS, GAME_FUNCTIONS};
use bridge_hooks::{BuildId, FunctionLocator, FunctionSpec, ModuleDescriptor, OffsetTable, ResolvedBy};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Engine,
    Game,
}

impl ModuleKind {
    pub fn functions(self) -> &'static [FunctionSpec] {
        match self {
            ModuleKind::Engine => ENGINE_FUNCTIONS,
            ModuleKind::Game => GAME_FUNCTIONS,
        }
    }
}

impl FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "engine" => Ok(ModuleKind::Engine),
            "game" => Ok(ModuleKind::Game),
            other => Err(format!("unknown module '{other}', expected engine or game")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionReport {
    pub name: &'static str,
    pub offset: Option<usize>,
    pub resolved_by: Option<ResolvedBy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub build_id: String,
    pub module: ModuleKind,
    pub functions: Vec<FunctionReport>,
}

impl Report {
    pub fn missing(&self) -> usize {
        self.functions.iter().filter(|f| f.offset.is_none()).count()
    }
}

pub fn check(image: &[u8], module: ModuleKind, offsets: &OffsetTable) -> Report {
    let build = BuildId::of(image);
    let descriptor = ModuleDescriptor {
        path: String::new(),
        image_base: 0,
        image_end: image.len(),
        base: 0,
        size: image.len(),
    };
    let table = FunctionLocator::new(&descriptor, image, Some(&build), offsets).locate_all(module.functions());

    let functions = module
        .functions()
        .iter()
        .map(|spec| {
            let resolution = table.get(spec.name);
            FunctionReport {
                name: spec.name,
                offset: resolution.map(|r| r.address),
                resolved_by: resolution.map(|r| r.by),
            }
        })
        .collect();

    Report {
        build_id: build.as_str().to_string(),
        module,
        functions,
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "build {}", self.build_id)?;
        for function in &self.functions {
            match (function.offset, function.resolved_by) {
                (Some(offset), Some(by)) => writeln!(f, "  {:<28} {:#010x} ({:?})", function.name, offset, by)?,
                _ => writeln!(f, "  {:<28} NOT FOUND", function.name)?,
            }
        }
        write!(f, "{}/{} resolved", self.functions.len() - self.missing(), self.functions.len())
    }
}
