//! Memory map parsing and module descriptors.

use crate::error::HookError;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// One line of `/proc/<pid>/maps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRegion {
    pub start: usize,
    pub end: usize,
    pub perms: String,
    pub offset: usize,
    pub path: Option<String>,
}

impl MapRegion {
    /// Parses a single maps line. Malformed lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let (start, end) = parts.next()?.split_once('-')?;
        let perms = parts.next()?.to_string();
        let offset = usize::from_str_radix(parts.next()?, 16).ok()?;
        let _dev = parts.next()?;
        let _inode = parts.next()?;
        // Paths may contain spaces; everything after the inode column is the path.
        let path: Vec<&str> = parts.collect();
        let path = (!path.is_empty()).then(|| path.join(" "));

        Some(Self {
            start: usize::from_str_radix(start, 16).ok()?,
            end: usize::from_str_radix(end, 16).ok()?,
            perms,
            offset,
            path,
        })
    }

    pub fn is_executable(&self) -> bool {
        self.perms.starts_with("r-x")
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn file_name(&self) -> Option<&str> {
        self.path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .and_then(|n| n.to_str())
    }
}

pub fn parse_maps<R: Read>(reader: R) -> Result<Vec<MapRegion>, HookError> {
    let mut regions = Vec::new();
    for line in BufReader::new(reader).lines() {
        if let Some(region) = MapRegion::parse(&line?) {
            regions.push(region);
        }
    }
    Ok(regions)
}

pub fn current_process_maps() -> Result<Vec<MapRegion>, HookError> {
    parse_maps(File::open("/proc/self/maps")?)
}

/// Base and size of a loaded image's executable range.
///
/// `base..base + size` is the range the scanner walks. `image_base` is the
/// lowest address the image is mapped at, which is what per-build offsets
/// are relative to; `image_end` is one past its highest mapped byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub path: String,
    pub image_base: usize,
    pub image_end: usize,
    pub base: usize,
    pub size: usize,
}

impl ModuleDescriptor {
    /// Finds the first executable mapping of the image whose file name is
    /// `file_name`.
    pub fn from_regions(regions: &[MapRegion], file_name: &str) -> Result<Self, HookError> {
        let owned: Vec<&MapRegion> = regions
            .iter()
            .filter(|r| r.file_name() == Some(file_name))
            .collect();

        let exec = owned
            .iter()
            .find(|r| r.is_executable())
            .ok_or_else(|| HookError::ModuleNotFound(file_name.to_string()))?;
        let image_base = owned.iter().map(|r| r.start).min().unwrap_or(exec.start);
        let image_end = owned.iter().map(|r| r.end).max().unwrap_or(exec.end);

        Ok(Self {
            path: exec.path.clone().unwrap_or_default(),
            image_base,
            image_end,
            base: exec.start,
            size: exec.len(),
        })
    }

    pub fn locate(file_name: &str) -> Result<Self, HookError> {
        Self::from_regions(&current_process_maps()?, file_name)
    }

    /// Finds the image that contains `address`, used when the engine hands
    /// us a pointer into a freshly loaded module rather than its name.
    pub fn containing(regions: &[MapRegion], address: usize) -> Result<Self, HookError> {
        let name = regions
            .iter()
            .find(|r| r.start <= address && address < r.end)
            .and_then(|r| r.file_name())
            .ok_or_else(|| HookError::ModuleNotFound(format!("{address:#x}")))?;
        Self::from_regions(regions, name)
    }

    pub fn contains(&self, address: usize) -> bool {
        self.base <= address && address < self.base + self.size
    }
}
