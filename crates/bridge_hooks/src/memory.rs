//! Access to code memory.
//!
//! [`CodeMemory`] is the seam between the hook installer and the address
//! space it patches. [`ProcessMemory`] is the live implementation;
//! [`BufferMemory`] backs a plain byte buffer for tests and offline tooling.

use crate::error::HookError;
use crate::maps::current_process_maps;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

pub trait CodeMemory: Send + Sync {
    fn read(&self, address: usize, len: usize) -> Result<Vec<u8>, HookError>;

    /// Writes `bytes` at `address`, lifting write protection for the
    /// duration of the copy.
    fn write(&self, address: usize, bytes: &[u8]) -> Result<(), HookError>;

    /// Reserves `len` bytes of executable memory and fills them with the
    /// code `build` produces for the chosen address. Code that embeds
    /// relative displacements needs to know where it will live.
    fn alloc_executable(
        &self,
        len: usize,
        build: &dyn Fn(usize) -> Option<Vec<u8>>,
    ) -> Result<usize, HookError>;

    /// Releases a block returned by [`alloc_executable`](Self::alloc_executable).
    /// `len` must be the length it was allocated with.
    fn free_executable(&self, address: usize, len: usize) -> Result<(), HookError>;

    fn read_pointer(&self, address: usize) -> Result<usize, HookError> {
        let bytes = self.read(address, std::mem::size_of::<usize>())?;
        let mut raw = [0u8; std::mem::size_of::<usize>()];
        raw.copy_from_slice(&bytes);
        Ok(usize::from_ne_bytes(raw))
    }

    fn write_pointer(&self, address: usize, value: usize) -> Result<(), HookError> {
        self.write(address, &value.to_ne_bytes())
    }
}

/// The current process's own address space.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemory;

impl ProcessMemory {
    fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            4096
        } else {
            size as usize
        }
    }

    fn protect(start: usize, len: usize, prot: libc::c_int) -> Result<(), HookError> {
        // SAFETY: start is page aligned and the range belongs to a mapping we
        // are about to patch.
        let rc = unsafe { libc::mprotect(start as *mut libc::c_void, len, prot) };
        if rc != 0 {
            return Err(HookError::Protect {
                address: start,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Protection currently in force at `address`, from the process maps.
    fn current_protection(address: usize) -> Option<libc::c_int> {
        let regions = current_process_maps().ok()?;
        let region = regions.iter().find(|r| r.start <= address && address < r.end)?;
        let perms = region.perms.as_bytes();
        let mut prot = libc::PROT_NONE;
        if perms.first() == Some(&b'r') {
            prot |= libc::PROT_READ;
        }
        if perms.get(1) == Some(&b'w') {
            prot |= libc::PROT_WRITE;
        }
        if perms.get(2) == Some(&b'x') {
            prot |= libc::PROT_EXEC;
        }
        Some(prot)
    }
}

impl CodeMemory for ProcessMemory {
    fn read(&self, address: usize, len: usize) -> Result<Vec<u8>, HookError> {
        let mut out = vec![0u8; len];
        // SAFETY: callers only read ranges inside modules they located in
        // the process maps.
        unsafe { std::ptr::copy_nonoverlapping(address as *const u8, out.as_mut_ptr(), len) };
        Ok(out)
    }

    fn write(&self, address: usize, bytes: &[u8]) -> Result<(), HookError> {
        let page = Self::page_size();
        let start = address & !(page - 1);
        let end = (address + bytes.len() + page - 1) & !(page - 1);
        let restore = Self::current_protection(address);

        Self::protect(start, end - start, libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC)?;
        // SAFETY: the range was just made writable and is mapped.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len()) };

        match restore {
            Some(prot) => {
                if let Err(e) = Self::protect(start, end - start, prot) {
                    warn!("⚠️ Patched {:#x} but could not restore protection: {}", address, e);
                }
            }
            None => debug!("No mapping found for {:#x}; leaving it RWX", address),
        }
        Ok(())
    }

    fn alloc_executable(
        &self,
        len: usize,
        build: &dyn Fn(usize) -> Option<Vec<u8>>,
    ) -> Result<usize, HookError> {
        // SAFETY: anonymous private mapping, no file descriptor involved.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len.max(1),
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(HookError::Mmap(std::io::Error::last_os_error()));
        }
        let address = ptr as usize;
        let code = match build(address) {
            Some(code) if code.len() <= len => code,
            _ => {
                // SAFETY: unmapping the block we just mapped.
                unsafe { libc::munmap(ptr, len.max(1)) };
                return Err(HookError::OutOfRange { from: address, to: 0 });
            }
        };
        // SAFETY: ptr points to at least len writable bytes.
        unsafe { std::ptr::copy_nonoverlapping(code.as_ptr(), ptr as *mut u8, code.len()) };
        Ok(address)
    }

    fn free_executable(&self, address: usize, len: usize) -> Result<(), HookError> {
        // SAFETY: the block came from our own mmap and nothing jumps into it
        // yet; callers free only trampolines that were never published.
        let rc = unsafe { libc::munmap(address as *mut libc::c_void, len.max(1)) };
        if rc != 0 {
            return Err(HookError::Munmap {
                address,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

/// A byte buffer pretending to live at `base`.
///
/// Executable allocations are recorded separately above the buffer's end so
/// that tests can inspect trampolines.
#[derive(Debug)]
pub struct BufferMemory {
    base: usize,
    bytes: Mutex<Vec<u8>>,
    executable: Mutex<Vec<(usize, Vec<u8>)>>,
    allocations: AtomicUsize,
    writes: AtomicUsize,
    read_only: AtomicBool,
}

impl BufferMemory {
    pub fn new(base: usize, bytes: Vec<u8>) -> Self {
        Self {
            base,
            bytes: Mutex::new(bytes),
            executable: Mutex::new(Vec::new()),
            allocations: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            read_only: AtomicBool::new(false),
        }
    }

    /// Makes every later `write` fail, as a page that refuses `mprotect`
    /// would.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Executable blocks currently allocated and not freed.
    pub fn executable_count(&self) -> usize {
        self.executable.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of `write` calls that reached the buffer.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn executable_block(&self, address: usize) -> Option<Vec<u8>> {
        self.executable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(at, _)| *at == address)
            .map(|(_, code)| code.clone())
    }

    fn range(&self, address: usize, len: usize, total: usize) -> Result<std::ops::Range<usize>, HookError> {
        let start = address
            .checked_sub(self.base)
            .ok_or(HookError::OutOfBounds { address, len })?;
        let end = start.checked_add(len).ok_or(HookError::OutOfBounds { address, len })?;
        if end > total {
            return Err(HookError::OutOfBounds { address, len });
        }
        Ok(start..end)
    }
}

impl CodeMemory for BufferMemory {
    fn read(&self, address: usize, len: usize) -> Result<Vec<u8>, HookError> {
        let bytes = self.bytes.lock().unwrap_or_else(|e| e.into_inner());
        let range = self.range(address, len, bytes.len())?;
        Ok(bytes[range].to_vec())
    }

    fn write(&self, address: usize, data: &[u8]) -> Result<(), HookError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(HookError::ReadOnly(address));
        }
        let mut bytes = self.bytes.lock().unwrap_or_else(|e| e.into_inner());
        let range = self.range(address, data.len(), bytes.len())?;
        bytes[range].copy_from_slice(data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn alloc_executable(
        &self,
        len: usize,
        build: &dyn Fn(usize) -> Option<Vec<u8>>,
    ) -> Result<usize, HookError> {
        let mut blocks = self.executable.lock().unwrap_or_else(|e| e.into_inner());
        let buffer_len = self.bytes.lock().unwrap_or_else(|e| e.into_inner()).len();
        let serial = self.allocations.fetch_add(1, Ordering::SeqCst);
        let address = self.base + buffer_len + 0x1000 * (serial + 1);
        let code = build(address)
            .filter(|code| code.len() <= len)
            .ok_or(HookError::OutOfRange { from: address, to: 0 })?;
        blocks.push((address, code));
        Ok(address)
    }

    fn free_executable(&self, address: usize, _len: usize) -> Result<(), HookError> {
        let mut blocks = self.executable.lock().unwrap_or_else(|e| e.into_inner());
        let index = blocks
            .iter()
            .position(|(at, _)| *at == address)
            .ok_or(HookError::OutOfBounds { address, len: 0 })?;
        blocks.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_memory_reads_and_writes_relative_to_base() {
        let mem = BufferMemory::new(0x40_0000, vec![0u8; 64]);
        mem.write(0x40_0010, &[1, 2, 3]).unwrap();

        assert_eq!(mem.read(0x40_0010, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(mem.write_count(), 1);
    }

    #[test]
    fn buffer_memory_rejects_out_of_range_access() {
        let mem = BufferMemory::new(0x1000, vec![0u8; 16]);
        assert!(mem.read(0x0fff, 1).is_err());
        assert!(mem.read(0x1000, 17).is_err());
        assert!(mem.write(0x100f, &[0, 0]).is_err());
        assert_eq!(mem.write_count(), 0);
    }

    #[test]
    fn pointer_round_trip() {
        let mem = BufferMemory::new(0x1000, vec![0u8; 32]);
        mem.write_pointer(0x1008, 0xdead_beef).unwrap();
        assert_eq!(mem.read_pointer(0x1008).unwrap(), 0xdead_beef);
    }

    #[test]
    fn process_memory_patches_an_executable_block() {
        let mem = ProcessMemory;
        let block = mem.alloc_executable(32, &|_| Some(vec![0xC3; 32])).unwrap();
        mem.write(block + 4, &[0x90, 0x90]).unwrap();

        let bytes = mem.read(block, 8).unwrap();
        assert_eq!(bytes, vec![0xC3, 0xC3, 0xC3, 0xC3, 0x90, 0x90, 0xC3, 0xC3]);
        mem.free_executable(block, 32).unwrap();
    }

    #[test]
    fn buffer_memory_tracks_executable_blocks() {
        let mem = BufferMemory::new(0x1000, vec![0u8; 16]);
        let first = mem.alloc_executable(4, &|_| Some(vec![0xC3])).unwrap();
        let second = mem.alloc_executable(4, &|_| Some(vec![0xC3])).unwrap();
        assert_ne!(first, second);

        mem.free_executable(first, 4).unwrap();
        assert_eq!(mem.executable_count(), 1);
        assert!(mem.executable_block(first).is_none());
        assert!(mem.free_executable(first, 4).is_err());
    }

    #[test]
    fn read_only_buffer_refuses_writes() {
        let mem = BufferMemory::new(0x1000, vec![0u8; 16]);
        mem.set_read_only(true);
        assert!(matches!(mem.write(0x1000, &[1]), Err(HookError::ReadOnly(0x1000))));
        assert_eq!(mem.write_count(), 0);
    }
}
