//! Hook installation and removal.
//!
//! Two hook kinds are supported:
//!
//! * **Inline** hooks overwrite a function prologue with a jump to a stub.
//!   The overwritten bytes are copied into a trampoline followed by a jump
//!   back to the rest of the original function, so the stub can call
//!   through to unmodified behaviour.
//! * **Slot** hooks swap one entry in a function pointer table. The old
//!   pointer is the call-through address.
//!
//! In both cases the original bytes are snapshotted strictly before the
//! redirect is written, and the redirect itself is a single write.

use crate::error::HookError;
use crate::jump;
use crate::memory::CodeMemory;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Inline { trampoline: usize },
    Slot { original: usize },
}

/// State of one hooked function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookRecord {
    pub target: usize,
    pub original_bytes: Vec<u8>,
    pub redirect: usize,
    pub installed: bool,
    pub kind: HookKind,
}

impl HookRecord {
    /// Address that runs the original behaviour.
    pub fn call_through(&self) -> usize {
        match self.kind {
            HookKind::Inline { trampoline } => trampoline,
            HookKind::Slot { original } => original,
        }
    }
}

pub struct HookInstaller<M: CodeMemory> {
    memory: M,
    records: DashMap<usize, HookRecord>,
}

impl<M: CodeMemory> HookInstaller<M> {
    pub fn new(memory: M) -> Self {
        Self {
            memory,
            records: DashMap::new(),
        }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Redirects the function at `target` to `stub`.
    ///
    /// The first `patch_len` bytes are snapshotted, copied into a fresh
    /// trampoline that jumps back to `target + patch_len`, and only then
    /// overwritten with the redirect.
    ///
    /// # Arguments
    ///
    /// * `target` - Entry point of the function to hook
    /// * `stub` - Address the function should run instead
    /// * `patch_len` - Instruction-aligned span of the prologue to replace.
    ///   It must be at least [`jump::redirect_size`] and the stolen
    ///   instructions must be position independent.
    ///
    /// # Returns
    ///
    /// The installed [`HookRecord`]; its [`call_through`](HookRecord::call_through)
    /// runs the original function. Installing twice at the same address
    /// returns the existing record untouched. On any error nothing has been
    /// written and no trampoline is left behind.
    pub fn install(&self, target: usize, stub: usize, patch_len: usize) -> Result<HookRecord, HookError> {
        let needed = jump::redirect_size();
        let slot = match self.records.entry(target) {
            Entry::Occupied(existing) => {
                debug!("Hook at {:#x} already installed", target);
                return Ok(existing.get().clone());
            }
            Entry::Vacant(slot) => slot,
        };

        if patch_len < needed {
            return Err(HookError::PatchTooShort {
                address: target,
                patch_len,
                needed,
            });
        }

        let original_bytes = self.memory.read(target, patch_len)?;
        let redirect = jump::redirect(target, stub, patch_len)
            .ok_or(HookError::OutOfRange { from: target, to: stub })?;

        let resume = target + patch_len;
        let stolen = original_bytes.clone();
        let trampoline = self.memory.alloc_executable(patch_len + needed, &|at| {
            let back = jump::redirect(at + patch_len, resume, needed)?;
            let mut code = stolen.clone();
            code.extend_from_slice(&back);
            Some(code)
        })?;

        if let Err(e) = self.memory.write(target, &redirect) {
            // Nothing can reach the trampoline yet, so it goes too.
            if let Err(free) = self.memory.free_executable(trampoline, patch_len + needed) {
                warn!("⚠️ Leaked trampoline {:#x}: {}", trampoline, free);
            }
            return Err(e);
        }

        let record = HookRecord {
            target,
            original_bytes,
            redirect: stub,
            installed: true,
            kind: HookKind::Inline { trampoline },
        };
        slot.insert(record.clone());
        info!("🪝 Inline hook {:#x} -> {:#x} (trampoline {:#x})", target, stub, trampoline);
        Ok(record)
    }

    /// Replaces the pointer stored at `slot_address` with `stub`.
    ///
    /// Used for function tables such as a game module's VM call table, where
    /// patching code is unnecessary.
    ///
    /// # Arguments
    ///
    /// * `slot_address` - Address of the pointer-sized table entry
    /// * `stub` - New value for the entry
    ///
    /// # Returns
    ///
    /// The installed [`HookRecord`], whose call-through is the pointer that
    /// was in the slot. A second install at the same slot returns the first
    /// record, so the original is never lost to our own stub.
    pub fn install_slot(&self, slot_address: usize, stub: usize) -> Result<HookRecord, HookError> {
        let slot = match self.records.entry(slot_address) {
            Entry::Occupied(existing) => {
                debug!("Slot hook at {:#x} already installed", slot_address);
                return Ok(existing.get().clone());
            }
            Entry::Vacant(slot) => slot,
        };

        let original_bytes = self.memory.read(slot_address, std::mem::size_of::<usize>())?;
        let original = self.memory.read_pointer(slot_address)?;
        self.memory.write_pointer(slot_address, stub)?;

        let record = HookRecord {
            target: slot_address,
            original_bytes,
            redirect: stub,
            installed: true,
            kind: HookKind::Slot { original },
        };
        slot.insert(record.clone());
        info!("🪝 Slot hook {:#x}: {:#x} -> {:#x}", slot_address, original, stub);
        Ok(record)
    }

    pub fn record(&self, target: usize) -> Option<HookRecord> {
        self.records.get(&target).map(|r| r.clone())
    }

    pub fn installed_count(&self) -> usize {
        self.records.len()
    }

    /// Restores the snapshot taken at install time.
    ///
    /// Trampolines are left mapped: a thread may still be executing inside
    /// one.
    pub fn uninstall(&self, target: usize) -> Result<HookRecord, HookError> {
        let (_, mut record) = self
            .records
            .remove(&target)
            .ok_or(HookError::NotInstalled(target))?;

        if let Err(e) = self.memory.write(target, &record.original_bytes) {
            // Keep the record so a later attempt can still restore it.
            self.records.insert(target, record);
            return Err(e);
        }
        record.installed = false;
        info!("🧹 Hook at {:#x} removed", target);
        Ok(record)
    }

    /// Removes every hook, continuing past individual failures.
    pub fn uninstall_all(&self) -> usize {
        let targets: Vec<usize> = self.records.iter().map(|r| *r.key()).collect();
        let mut restored = 0;
        for target in targets {
            match self.uninstall(target) {
                Ok(_) => restored += 1,
                Err(e) => warn!("⚠️ Failed to remove hook at {:#x}: {}", target, e),
            }
        }
        restored
    }

    /// Drops bookkeeping for hooks inside an image that has been unloaded.
    /// Nothing is written: the memory is gone.
    pub fn forget_range(&self, start: usize, end: usize) -> usize {
        let before = self.records.len();
        self.records.retain(|target, _| !(start <= *target && *target < end));
        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BufferMemory;

    const BASE: usize = 0x7000_0000;
    const STUB: usize = 0x7100_0000;

    fn prologue_image() -> Vec<u8> {
        let mut image = vec![0xCC; 0x200];
        let prologue = [
            0x41, 0x57, 0x4C, 0x63, 0xFF, 0x41, 0x56, 0x41, 0x89, 0xF6, 0x41, 0x55, 0x41, 0x54, 0x55,
            0x4C, 0x89, 0xFD,
        ];
        image[0x40..0x40 + prologue.len()].copy_from_slice(&prologue);
        image
    }

    fn installer() -> HookInstaller<BufferMemory> {
        HookInstaller::new(BufferMemory::new(BASE, prologue_image()))
    }

    #[test]
    fn install_snapshots_then_redirects() {
        let hooks = installer();
        let patch_len = jump::redirect_size().max(14);
        let record = hooks.install(BASE + 0x40, STUB, patch_len).unwrap();

        assert_eq!(record.original_bytes, prologue_image()[0x40..0x40 + patch_len].to_vec());
        assert!(record.installed);

        let patched = hooks.memory().read(BASE + 0x40, patch_len).unwrap();
        assert_eq!(patched, jump::redirect(BASE + 0x40, STUB, patch_len).unwrap());
    }

    #[test]
    fn double_install_is_a_no_op() {
        let hooks = installer();
        let first = hooks.install(BASE + 0x40, STUB, 14).unwrap();
        let second = hooks.install(BASE + 0x40, STUB + 0x10, 14).unwrap();

        assert_eq!(first, second);
        assert_eq!(hooks.memory().write_count(), 1);
        assert_eq!(hooks.installed_count(), 1);
    }

    #[test]
    fn trampoline_holds_stolen_bytes_and_jumps_back() {
        let hooks = installer();
        let record = hooks.install(BASE + 0x40, STUB, 14).unwrap();
        let trampoline = record.call_through();

        let code = hooks.memory().executable_block(trampoline).unwrap();
        assert_eq!(&code[..14], &record.original_bytes[..]);
        let back = jump::redirect(trampoline + 14, BASE + 0x40 + 14, jump::redirect_size()).unwrap();
        assert_eq!(&code[14..], &back[..]);
    }

    #[test]
    fn short_patch_is_refused_without_touching_memory() {
        let hooks = installer();
        let err = hooks.install(BASE + 0x40, STUB, jump::redirect_size() - 1).unwrap_err();

        assert!(matches!(err, HookError::PatchTooShort { .. }));
        assert_eq!(hooks.memory().write_count(), 0);
        assert!(hooks.record(BASE + 0x40).is_none());
    }

    #[test]
    fn unwritable_target_fails_only_that_hook() {
        let hooks = installer();
        assert!(hooks.install(BASE + 0x1000, STUB, 14).is_err());
        assert!(hooks.install(BASE + 0x40, STUB, 14).is_ok());
        assert_eq!(hooks.installed_count(), 1);
    }

    #[test]
    fn failed_redirect_releases_the_trampoline() {
        let hooks = installer();
        hooks.memory().set_read_only(true);

        let err = hooks.install(BASE + 0x40, STUB, 14).unwrap_err();
        assert!(matches!(err, HookError::ReadOnly(_)));
        assert_eq!(hooks.memory().executable_count(), 0);
        assert!(hooks.record(BASE + 0x40).is_none());

        hooks.memory().set_read_only(false);
        assert!(hooks.install(BASE + 0x40, STUB, 14).is_ok());
        assert_eq!(hooks.memory().executable_count(), 1);
    }

    #[test]
    fn uninstall_restores_original_bytes() {
        let hooks = installer();
        hooks.install(BASE + 0x40, STUB, 14).unwrap();
        let record = hooks.uninstall(BASE + 0x40).unwrap();

        assert!(!record.installed);
        assert_eq!(hooks.memory().snapshot(), prologue_image());
        assert!(matches!(hooks.uninstall(BASE + 0x40), Err(HookError::NotInstalled(_))));
    }

    #[test]
    fn slot_hook_swaps_pointer_and_remembers_original() {
        let mut table = vec![0u8; 0x40];
        let width = std::mem::size_of::<usize>();
        table[0x18..0x18 + width].copy_from_slice(&0xAAAA_BBBBusize.to_ne_bytes());
        let hooks = HookInstaller::new(BufferMemory::new(BASE, table));

        let record = hooks.install_slot(BASE + 0x18, STUB).unwrap();
        assert_eq!(record.call_through(), 0xAAAA_BBBB);
        assert_eq!(hooks.memory().read_pointer(BASE + 0x18).unwrap(), STUB);

        let again = hooks.install_slot(BASE + 0x18, STUB + 8).unwrap();
        assert_eq!(again, record);

        hooks.uninstall(BASE + 0x18).unwrap();
        assert_eq!(hooks.memory().read_pointer(BASE + 0x18).unwrap(), 0xAAAA_BBBB);
    }

    #[test]
    fn uninstall_all_and_forget_range() {
        let hooks = installer();
        hooks.install(BASE + 0x40, STUB, 14).unwrap();
        assert_eq!(hooks.uninstall_all(), 1);

        hooks.install(BASE + 0x40, STUB, 14).unwrap();
        assert_eq!(hooks.forget_range(BASE, BASE + 0x200), 1);
        assert_eq!(hooks.installed_count(), 0);
    }
}
