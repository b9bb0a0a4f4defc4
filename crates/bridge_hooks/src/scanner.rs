//! First-match signature scanning.
//!
//! Scan order is ascending and deterministic: for a given image the same
//! signature always resolves to the same (lowest) address, which matters
//! because some callers derive further addresses relative to the match.

use crate::signature::Signature;

/// Returns the offset of the first occurrence of `signature` in `haystack`.
pub fn find_in(haystack: &[u8], signature: &Signature) -> Option<usize> {
    if signature.is_empty() || haystack.len() < signature.len() {
        return None;
    }

    let last = haystack.len() - signature.len();
    (0..=last).find(|&offset| signature.matches(&haystack[offset..offset + signature.len()]))
}

/// Scans a module range whose first byte lives at `base`, returning the
/// absolute address of the first match.
pub fn find(base: usize, range: &[u8], signature: &Signature) -> Option<usize> {
    find_in(range, signature).map(|offset| base + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with(needle: &[u8], at: usize, len: usize) -> Vec<u8> {
        let mut image = vec![0xCC; len];
        image[at..at + needle.len()].copy_from_slice(needle);
        image
    }

    #[test]
    fn literal_signature_finds_its_only_occurrence() {
        let needle = [0x41, 0x57, 0x4C, 0x63, 0xFF, 0x41, 0x56];
        let image = image_with(&needle, 0x1234, 0x4000);
        let sig = Signature::literal(&needle);

        assert_eq!(find_in(&image, &sig), Some(0x1234));
    }

    #[test]
    fn missing_signature_is_not_found() {
        let image = vec![0xCC; 0x1000];
        let sig = Signature::literal(&[0x41, 0x57, 0x4C]);
        assert_eq!(find_in(&image, &sig), None);
    }

    #[test]
    fn first_match_wins() {
        let needle = [0x55, 0x48, 0x89, 0xE5];
        let mut image = image_with(&needle, 0x800, 0x1000);
        image[0x100..0x104].copy_from_slice(&needle);

        assert_eq!(find_in(&image, &Signature::literal(&needle)), Some(0x100));
    }

    #[test]
    fn match_at_the_very_end_is_found() {
        let needle = [0x8B, 0x05, 0xC3];
        let image = image_with(&needle, 0x100 - 3, 0x100);
        assert_eq!(find_in(&image, &Signature::literal(&needle)), Some(0x100 - 3));
    }

    #[test]
    fn wildcards_skip_relocated_bytes() {
        let image = image_with(&[0x8B, 0x05, 0x11, 0x22, 0x33, 0x44, 0xC3], 0x40, 0x200);
        let sig = Signature::parse("8B 05 ? ? ? ? C3").unwrap();
        assert_eq!(find_in(&image, &sig), Some(0x40));
    }

    #[test]
    fn haystack_shorter_than_signature() {
        let sig = Signature::literal(&[1, 2, 3, 4]);
        assert_eq!(find_in(&[1, 2, 3], &sig), None);
    }

    #[test]
    fn absolute_address_is_relative_to_range_base() {
        let needle = [0x0F, 0x1F, 0x44, 0x00, 0x00];
        let image = image_with(&needle, 0x30, 0x100);
        assert_eq!(find(0x40_0000, &image, &Signature::literal(&needle)), Some(0x40_0030));
    }
}
