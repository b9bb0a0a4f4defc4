//! Entry shims for hooked variadic functions.
//!
//! A Rust stub cannot take `...` arguments, and rebuilding a call from the
//! values it can see loses floating point arguments and anything passed on
//! the stack. So a variadic hook enters through a small assembly shim
//! instead:
//!
//! 1. The shim spills every argument register into a [`RegisterFrame`] and
//!    calls a Rust decision function with the frame and the address of the
//!    caller's stack arguments.
//! 2. The decision function returns the address to forward to, or `0` when
//!    it already handled the call.
//! 3. On a forward the shim restores every argument register, including
//!    `al` and the vector registers on x86_64, pops its frame and jumps. The
//!    target sees exactly the call the engine made.
//!
//! Only x86 and x86_64 are supported, the two targets the server ships for.

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
compile_error!("variadic entry shims exist for x86 and x86_64 only");

use super::printf::VaArgs;

/// Argument registers as the shim spilled them.
#[cfg(target_arch = "x86_64")]
#[repr(C)]
pub struct RegisterFrame {
    /// rdi, rsi, rdx, rcx, r8, r9.
    pub gp: [usize; 6],
    /// xmm0 to xmm7, low and high quadwords.
    pub xmm: [[u64; 2]; 8],
    /// rax; `al` is the caller's upper bound on vector registers used.
    pub rax: usize,
    _pad: usize,
}

/// cdecl passes every argument on the stack; nothing is spilled.
#[cfg(target_arch = "x86")]
#[repr(C)]
pub struct RegisterFrame {
    _private: [u8; 0],
}

#[cfg(target_arch = "x86")]
static NO_REGISTERS: RegisterFrame = RegisterFrame { _private: [] };

/// Signature of the Rust side of a shim. Returns the forward address, or
/// `0` if the call is complete.
pub type EntryHandler = unsafe extern "C" fn(frame: *const RegisterFrame, stack: *const u8) -> usize;

/// One captured call of a variadic function with `fixed` named parameters.
pub struct CapturedCall<'a> {
    #[cfg_attr(target_arch = "x86", allow(dead_code))]
    frame: &'a RegisterFrame,
    stack: *const u8,
    fixed: usize,
    floats: [f64; 8],
}

impl<'a> CapturedCall<'a> {
    /// # Safety
    ///
    /// `frame` and `stack` must be the values a shim passed to its handler,
    /// and `fixed` the number of named parameters of the hooked function.
    pub unsafe fn new(frame: *const RegisterFrame, stack: *const u8, fixed: usize) -> Option<Self> {
        #[cfg(target_arch = "x86_64")]
        let frame = frame.as_ref()?;
        #[cfg(target_arch = "x86")]
        let frame = frame.as_ref().unwrap_or(&NO_REGISTERS);
        if stack.is_null() {
            return None;
        }
        #[cfg(target_arch = "x86_64")]
        let floats = {
            let mut floats = [0.0; 8];
            for (out, xmm) in floats.iter_mut().zip(frame.xmm.iter()) {
                *out = f64::from_bits(xmm[0]);
            }
            floats
        };
        #[cfg(target_arch = "x86")]
        let floats = [0.0; 8];
        Some(Self {
            frame,
            stack,
            fixed,
            floats,
        })
    }

    /// The named parameter at `index`, as a machine word.
    pub fn fixed(&self, index: usize) -> usize {
        debug_assert!(index < self.fixed);
        #[cfg(target_arch = "x86_64")]
        {
            self.frame.gp[index]
        }
        #[cfg(target_arch = "x86")]
        {
            // SAFETY: named parameters sit at the start of the argument area.
            unsafe { self.stack.cast::<usize>().add(index).read_unaligned() }
        }
    }

    /// The variable arguments, in `va_arg` order.
    pub fn varargs(&self) -> VaArgs<'_> {
        #[cfg(target_arch = "x86_64")]
        {
            let vector_count = (self.frame.rax & 0xff).min(self.floats.len());
            let args = VaArgs::new(&self.frame.gp[self.fixed..], &self.floats[..vector_count]);
            // SAFETY: `stack` is the caller's argument area; the caller's
            // frames above it keep the following bytes mapped.
            unsafe { args.with_overflow(self.stack) }
        }
        #[cfg(target_arch = "x86")]
        {
            let _ = &self.floats;
            let after_fixed = self.stack.wrapping_add(self.fixed * std::mem::size_of::<usize>());
            // SAFETY: as above, past the named parameters.
            unsafe { VaArgs::new(&[], &[]).with_overflow(after_fixed) }
        }
    }
}

/// Defines the global function `$entry`, a shim that hands its call to the
/// [`EntryHandler`] `$handler`.
macro_rules! variadic_entry {
    ($entry:literal, $handler:path) => {
        const _: $crate::stubs::variadic::EntryHandler = $handler;

        #[cfg(target_arch = "x86_64")]
        std::arch::global_asm!(
            ".pushsection .text",
            concat!(".globl ", $entry),
            concat!(".hidden ", $entry),
            concat!(".type ", $entry, ",@function"),
            ".p2align 4",
            concat!($entry, ":"),
            "push rbp",
            "mov rbp, rsp",
            "sub rsp, 0xC0",
            "mov qword ptr [rsp + 0x00], rdi",
            "mov qword ptr [rsp + 0x08], rsi",
            "mov qword ptr [rsp + 0x10], rdx",
            "mov qword ptr [rsp + 0x18], rcx",
            "mov qword ptr [rsp + 0x20], r8",
            "mov qword ptr [rsp + 0x28], r9",
            "movaps xmmword ptr [rsp + 0x30], xmm0",
            "movaps xmmword ptr [rsp + 0x40], xmm1",
            "movaps xmmword ptr [rsp + 0x50], xmm2",
            "movaps xmmword ptr [rsp + 0x60], xmm3",
            "movaps xmmword ptr [rsp + 0x70], xmm4",
            "movaps xmmword ptr [rsp + 0x80], xmm5",
            "movaps xmmword ptr [rsp + 0x90], xmm6",
            "movaps xmmword ptr [rsp + 0xA0], xmm7",
            "mov qword ptr [rsp + 0xB0], rax",
            "mov rdi, rsp",
            "lea rsi, [rbp + 0x10]",
            "call {handler}",
            "test rax, rax",
            "jz 2f",
            "mov r11, rax",
            "mov rdi, qword ptr [rsp + 0x00]",
            "mov rsi, qword ptr [rsp + 0x08]",
            "mov rdx, qword ptr [rsp + 0x10]",
            "mov rcx, qword ptr [rsp + 0x18]",
            "mov r8, qword ptr [rsp + 0x20]",
            "mov r9, qword ptr [rsp + 0x28]",
            "movaps xmm0, xmmword ptr [rsp + 0x30]",
            "movaps xmm1, xmmword ptr [rsp + 0x40]",
            "movaps xmm2, xmmword ptr [rsp + 0x50]",
            "movaps xmm3, xmmword ptr [rsp + 0x60]",
            "movaps xmm4, xmmword ptr [rsp + 0x70]",
            "movaps xmm5, xmmword ptr [rsp + 0x80]",
            "movaps xmm6, xmmword ptr [rsp + 0x90]",
            "movaps xmm7, xmmword ptr [rsp + 0xA0]",
            "mov rax, qword ptr [rsp + 0xB0]",
            "leave",
            "jmp r11",
            "2:",
            "leave",
            "ret",
            concat!(".size ", $entry, ", . - ", $entry),
            ".popsection",
            handler = sym $handler,
        );

        #[cfg(target_arch = "x86")]
        std::arch::global_asm!(
            ".pushsection .text",
            concat!(".globl ", $entry),
            concat!(".hidden ", $entry),
            concat!(".type ", $entry, ",@function"),
            ".p2align 4",
            concat!($entry, ":"),
            "push ebp",
            "mov ebp, esp",
            "lea eax, [ebp + 8]",
            "push eax",
            "push 0",
            "call {handler}",
            "leave",
            "test eax, eax",
            "jz 2f",
            "jmp eax",
            "2:",
            "ret",
            concat!(".size ", $entry, ", . - ", $entry),
            ".popsection",
            handler = sym $handler,
        );
    };
}

pub(crate) use variadic_entry;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::printf::render;
    use std::ffi::{c_char, c_double, c_int, CStr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    static RENDERED: Mutex<Option<String>> = Mutex::new(None);
    static FORWARD_TO: AtomicUsize = AtomicUsize::new(0);
    static FORWARDED: Mutex<Option<(usize, f64, c_int)>> = Mutex::new(None);

    /// Renders the line with one named parameter, then forwards if asked to.
    unsafe extern "C" fn render_then_decide(frame: *const RegisterFrame, stack: *const u8) -> usize {
        let Some(call) = CapturedCall::new(frame, stack, 1) else {
            return 0;
        };
        let format = CStr::from_ptr(call.fixed(0) as *const c_char).to_bytes();
        let line = render(format, &mut call.varargs(), |ptr| {
            (ptr != 0).then(|| CStr::from_ptr(ptr as *const c_char).to_bytes().to_vec())
        });
        *RENDERED.lock().unwrap() = Some(String::from_utf8_lossy(&line).into_owned());
        FORWARD_TO.load(Ordering::SeqCst)
    }

    variadic_entry!("qlbridge_test_variadic_entry", render_then_decide);

    extern "C" {
        fn qlbridge_test_variadic_entry(fmt: *const c_char, ...);
    }

    /// Stands in for the engine function: records the arguments it sees.
    extern "C" fn engine_print(fmt: *const c_char, seconds: c_double, count: c_int) {
        *FORWARDED.lock().unwrap() = Some((fmt as usize, seconds, count));
    }

    // Both cases share the shim's statics, so they run in one test.
    #[test]
    fn shim_captures_every_argument_and_forwards_the_original_call() {
        let name = c"Anarki";
        unsafe {
            qlbridge_test_variadic_entry(
                c"%s: %d frags, %.2f min, %d %d %d %d %d\n".as_ptr(),
                name.as_ptr(),
                17 as c_int,
                3.25 as c_double,
                1 as c_int,
                2 as c_int,
                3 as c_int,
                4 as c_int,
                5 as c_int,
            );
        }
        assert_eq!(
            RENDERED.lock().unwrap().take().as_deref(),
            Some("Anarki: 17 frags, 3.25 min, 1 2 3 4 5\n")
        );
        assert!(FORWARDED.lock().unwrap().is_none());

        FORWARD_TO.store(engine_print as usize, Ordering::SeqCst);
        let fmt = c"Map loaded in %.2f seconds (%d)\n";
        unsafe { qlbridge_test_variadic_entry(fmt.as_ptr(), 1.5 as c_double, 42 as c_int) };
        FORWARD_TO.store(0, Ordering::SeqCst);

        assert_eq!(*FORWARDED.lock().unwrap(), Some((fmt.as_ptr() as usize, 1.5, 42)));
        assert_eq!(
            RENDERED.lock().unwrap().take().as_deref(),
            Some("Map loaded in 1.50 seconds (42)\n")
        );
    }
}
