//! The game module's VM call table.
//!
//! `dllEntry` stores the engine's syscall pointer with a RIP-relative `mov`
//! whose displacement also locates the table of exported game entry points.
//! Entries in that table are replaced with slot hooks.

use bridge_hooks::{CodeMemory, HookError};

/// Offset of the displacement inside `dllEntry`.
const DISPLACEMENT_OFFSET: usize = 0x3;

pub const INIT_GAME_SLOT: usize = 0x18;
pub const RUN_FRAME_SLOT: usize = 0x8;

/// Address of the VM call table, given the address of `dllEntry`.
pub fn call_table<M: CodeMemory + ?Sized>(memory: &M, dll_entry: usize) -> Result<usize, HookError> {
    let at = dll_entry + DISPLACEMENT_OFFSET;
    let raw = memory.read(at, 4)?;
    let bytes: [u8; 4] = raw
        .as_slice()
        .try_into()
        .map_err(|_| HookError::OutOfBounds { address: at, len: 4 })?;
    let displacement = i32::from_le_bytes(bytes) as isize;
    (at as isize)
        .checked_add(displacement + 4)
        .map(|table| table as usize)
        .ok_or(HookError::OutOfRange { from: at, to: 0 })
}
