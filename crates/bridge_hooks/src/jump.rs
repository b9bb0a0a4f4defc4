//! Redirect encodings written over a hooked prologue.

/// `jmp [rip+0]` followed by the 8-byte target.
pub const ABS_JMP_SIZE: usize = 14;
/// `jmp rel32`.
pub const REL_JMP_SIZE: usize = 5;
pub const NOP: u8 = 0x90;

pub fn abs_jump(target: usize) -> [u8; ABS_JMP_SIZE] {
    let mut bytes = [0u8; ABS_JMP_SIZE];
    bytes[0] = 0xFF;
    bytes[1] = 0x25;
    bytes[6..14].copy_from_slice(&(target as u64).to_le_bytes());
    bytes
}

/// Encodes a relative jump placed at `from`, or `None` when `to` is more
/// than ±2GiB away.
pub fn rel_jump(from: usize, to: usize) -> Option<[u8; REL_JMP_SIZE]> {
    let displacement = to as i64 - (from as i64 + REL_JMP_SIZE as i64);
    let displacement = i32::try_from(displacement).ok()?;

    let mut bytes = [0u8; REL_JMP_SIZE];
    bytes[0] = 0xE9;
    bytes[1..5].copy_from_slice(&displacement.to_le_bytes());
    Some(bytes)
}

/// Size of the redirect the installer writes on this architecture.
pub const fn redirect_size() -> usize {
    if cfg!(target_pointer_width = "64") {
        ABS_JMP_SIZE
    } else {
        REL_JMP_SIZE
    }
}

/// Encodes a jump from `from` to `to` padded with NOPs to `patch_len`.
///
/// 64-bit targets always use the absolute form so trampolines and stubs can
/// live anywhere in the address space.
pub fn redirect(from: usize, to: usize, patch_len: usize) -> Option<Vec<u8>> {
    let mut bytes = if cfg!(target_pointer_width = "64") {
        abs_jump(to).to_vec()
    } else {
        rel_jump(from, to)?.to_vec()
    };
    if patch_len < bytes.len() {
        return None;
    }
    bytes.resize(patch_len, NOP);
    Some(bytes)
}
