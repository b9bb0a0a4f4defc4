//! Byte signatures with wildcard positions.

use crate::error::HookError;
use std::fmt;

/// An ordered sequence of (byte, wildcard) pairs identifying a function's
/// machine code.
///
/// Signatures are authored as space separated hex pairs where `?` or `??`
/// marks a byte that differs between builds (relocated addresses, stack
/// frame sizes):
///
/// ```
/// use bridge_hooks::Signature;
///
/// let sig = Signature::parse("41 57 4C 63 FF ?? 56").unwrap();
/// assert_eq!(sig.len(), 7);
/// assert!(sig.is_wildcard(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<u8>,
    /// `true` where the byte must match, `false` for wildcards.
    mask: Vec<bool>,
}

impl Signature {
    pub fn parse(pattern: &str) -> Result<Self, HookError> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();

        for token in pattern.split_whitespace() {
            match token {
                "?" | "??" => {
                    bytes.push(0);
                    mask.push(false);
                }
                hex if hex.len() == 2 => {
                    let byte = u8::from_str_radix(hex, 16).map_err(|_| {
                        HookError::SignatureParse(format!("bad hex byte '{hex}' in '{pattern}'"))
                    })?;
                    bytes.push(byte);
                    mask.push(true);
                }
                other => {
                    return Err(HookError::SignatureParse(format!(
                        "unexpected token '{other}' in '{pattern}'"
                    )))
                }
            }
        }

        if bytes.is_empty() {
            return Err(HookError::SignatureParse("empty signature".to_string()));
        }
        if !mask.iter().any(|m| *m) {
            return Err(HookError::SignatureParse(format!(
                "signature '{pattern}' has no literal bytes"
            )));
        }

        Ok(Self { bytes, mask })
    }

    /// Builds a signature with no wildcards.
    pub fn literal(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            mask: vec![true; bytes.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_wildcard(&self, index: usize) -> bool {
        !self.mask.get(index).copied().unwrap_or(false)
    }

    /// Compares the signature against `window`, which must be at least
    /// `self.len()` bytes long.
    #[inline]
    pub fn matches(&self, window: &[u8]) -> bool {
        if window.len() < self.bytes.len() {
            return false;
        }
        self.bytes
            .iter()
            .zip(&self.mask)
            .zip(window)
            .all(|((expected, literal), actual)| !*literal || expected == actual)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (byte, literal)) in self.bytes.iter().zip(&self.mask).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if *literal {
                write!(f, "{byte:02X}")?;
            } else {
                f.write_str("??")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_double_wildcards() {
        let sig = Signature::parse("48 8B ? ?? C3").unwrap();
        assert_eq!(sig.len(), 5);
        assert!(!sig.is_wildcard(0));
        assert!(sig.is_wildcard(2));
        assert!(sig.is_wildcard(3));
        assert_eq!(sig.to_string(), "48 8B ?? ?? C3");
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(Signature::parse("").is_err());
        assert!(Signature::parse("?? ??").is_err());
        assert!(Signature::parse("4G").is_err());
        assert!(Signature::parse("488B").is_err());
    }

    #[test]
    fn wildcards_match_any_byte() {
        let sig = Signature::parse("55 ?? 89").unwrap();
        assert!(sig.matches(&[0x55, 0x00, 0x89]));
        assert!(sig.matches(&[0x55, 0xFF, 0x89, 0x01]));
        assert!(!sig.matches(&[0x55, 0xFF, 0x88]));
        assert!(!sig.matches(&[0x55, 0xFF]));
    }
}
