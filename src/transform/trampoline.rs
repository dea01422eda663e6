//! Position-independent machine code that returns the address of its own trailing data.
//!
//! A stub is `code || payload`. When called, the code computes the absolute address of the
//! first payload byte from the current instruction pointer and returns it in `eax` / `rax`.
//! It never reads the payload and makes no assumption about where it was loaded.
//!
//! # x86
//!
//! x86 has no instruction-pointer relative addressing, so the address is obtained by
//! calling the next instruction and popping the pushed return address:
//!
//! ```text
//! 55                push ebp
//! 89 E5             mov  ebp, esp
//! E8 00 00 00 00    call next
//! 58          next: pop  eax            ; eax = address of next
//! 83 C0 xx          add  eax, data - next
//! 5D                pop  ebp
//! C3                ret
//!             data: payload...
//! ```
//!
//! # x64
//!
//! ```text
//! 48 8D 05 xx xx xx xx    lea rax, [rip + (data - anchor)]
//! C3              anchor: ret
//!                   data: payload...
//! ```
//!
//! In both cases the displacement is measured from emitted instruction lengths and patched
//! in once the start of the payload is known.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Instruction set the stubs are generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// 32-bit x86, paired with `PE32` images
    X86,
    /// x86-64, paired with `PE32+` images
    X64,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "x86"),
            Architecture::X64 => write!(f, "x64"),
        }
    }
}

/// A growable code buffer with forward fix-ups.
struct Emitter {
    code: Vec<u8>,
}

impl Emitter {
    fn new() -> Self {
        Emitter {
            code: Vec::with_capacity(16),
        }
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Current offset, used as an anchor or as the target of a fix-up
    fn position(&self) -> usize {
        self.code.len()
    }

    /// Emits `width` placeholder bytes and returns their offset
    fn reserve(&mut self, width: usize) -> usize {
        let at = self.position();
        self.code.resize(at + width, 0);
        at
    }

    #[allow(clippy::cast_possible_truncation)]
    fn patch_u8(&mut self, at: usize, value: usize) {
        debug_assert!(value <= usize::from(u8::MAX));
        self.code[at] = value as u8;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn patch_u32(&mut self, at: usize, value: usize) {
        debug_assert!(u32::try_from(value).is_ok());
        self.code[at..at + 4].copy_from_slice(&(value as u32).to_le_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.code
    }
}

fn emit_x86(asm: &mut Emitter) {
    asm.emit(&[0x55]); // push ebp
    asm.emit(&[0x89, 0xE5]); // mov ebp, esp
    asm.emit(&[0xE8, 0x00, 0x00, 0x00, 0x00]); // call next
    let next = asm.position();
    asm.emit(&[0x58]); // pop eax
    asm.emit(&[0x83, 0xC0]); // add eax, imm8
    let fixup = asm.reserve(1);
    asm.emit(&[0x5D]); // pop ebp
    asm.emit(&[0xC3]); // ret

    let data = asm.position();
    asm.patch_u8(fixup, data - next);
}

fn emit_x64(asm: &mut Emitter) {
    asm.emit(&[0x48, 0x8D, 0x05]); // lea rax, [rip + disp32]
    let fixup = asm.reserve(4);
    let anchor = asm.position();
    asm.emit(&[0xC3]); // ret

    let data = asm.position();
    asm.patch_u32(fixup, data - anchor);
}

/// Builds the stub for `arch`: code followed by `payload`.
///
/// ```rust
/// use dotstub::transform::trampoline::{code_len, synthesize};
/// use dotstub::Architecture;
///
/// let stub = synthesize(Architecture::X64, b"Hi\0");
/// assert_eq!(&stub[..code_len(Architecture::X64)], &[0x48, 0x8D, 0x05, 0x01, 0x00, 0x00, 0x00, 0xC3]);
/// assert_eq!(&stub[code_len(Architecture::X64)..], b"Hi\0");
/// ```
#[must_use]
pub fn synthesize(arch: Architecture, payload: &[u8]) -> Vec<u8> {
    let mut asm = Emitter::new();
    match arch {
        Architecture::X86 => emit_x86(&mut asm),
        Architecture::X64 => emit_x64(&mut asm),
    }
    asm.emit(payload);
    asm.finish()
}

/// Length of the executable prefix for `arch`; the payload starts at this offset
#[must_use]
pub fn code_len(arch: Architecture) -> usize {
    synthesize(arch, &[]).len()
}
