//! Binary build identification for the offset fallback table.

use crate::error::HookError;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::Path;

/// Lower-case hex SHA-1 of an image file's contents.
///
/// The same identifier is produced for the on-disk binary (operator tooling)
/// and for a module mapped into the running process, since the latter is
/// computed from the file backing the mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildId(String);

impl BuildId {
    pub fn of(image: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(image);
        let digest = hasher.finalize();
        Self(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HookError> {
        Ok(Self::of(&std::fs::read(path)?))
    }

    /// Wraps an identifier computed elsewhere, e.g. by operator tooling.
    pub fn from_hex(id: &str) -> Self {
        Self(id.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn known_digest() {
        assert_eq!(
            BuildId::of(b"abc").as_str(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn file_and_buffer_agree() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"\x7fELF fake image").unwrap();

        let from_file = BuildId::from_file(file.path()).unwrap();
        assert_eq!(from_file, BuildId::of(b"\x7fELF fake image"));
    }
}
