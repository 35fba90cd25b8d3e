//! AArch64 architecture implementation (AAPCS64).

use super::Arch;
use crate::context::StackWriter;
use core::fmt;

/// Default FPCR: round to nearest, no traps, IEEE semantics.
pub const DEFAULT_FPCR: u64 = 0;

/// AArch64 architecture implementation.
pub struct Aarch64Arch;

/// AArch64 saved context: callee-saved integer registers, frame and link
/// registers, the low halves of v8-v15 and the floating-point control register.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aarch64Context {
    pub sp: u64,
    pub x19_x28: [u64; 10],
    pub fp: u64,
    pub lr: u64,
    pub d8_d15: [u64; 8],
    pub fpcr: u64,
}

// Offsets hard-coded in `switch_context`.
const _: () = {
    assert!(core::mem::offset_of!(Aarch64Context, sp) == 0);
    assert!(core::mem::offset_of!(Aarch64Context, fp) == 88);
    assert!(core::mem::offset_of!(Aarch64Context, d8_d15) == 104);
    assert!(core::mem::offset_of!(Aarch64Context, fpcr) == 168);
};

impl Default for Aarch64Context {
    fn default() -> Self {
        Self {
            sp: 0,
            x19_x28: [0; 10],
            fp: 0,
            lr: 0,
            d8_d15: [0; 8],
            fpcr: DEFAULT_FPCR,
        }
    }
}

impl Aarch64Context {
    pub fn stack_pointer(&self) -> u64 {
        self.sp
    }

    pub fn link_register(&self) -> u64 {
        self.lr
    }

    pub fn write_registers<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "\tSP: {:#x}", self.sp)?;
        for (index, value) in self.x19_x28.iter().enumerate() {
            writeln!(out, "\tX{}: {:#x}", index + 19, value)?;
        }
        writeln!(out, "\tFP: {:#x}", self.fp)?;
        writeln!(out, "\tLR: {:#x}", self.lr)?;
        writeln!(out, "\tFPCR: {:#x}", self.fpcr)
    }
}

impl Arch for Aarch64Arch {
    type Context = Aarch64Context;

    unsafe fn switch(prev: *mut Self::Context, next: *const Self::Context) {
        unsafe { switch_context(prev, next) }
    }

    /// `entry` and `arg` sit in the two words below the aligned top, `sp`
    /// points at `entry`, and the link register holds the trampoline so the
    /// switch's `ret` lands there. The trampoline pops both words, leaving
    /// `sp` at the aligned top.
    fn prepare(context: &mut Self::Context, writer: &mut StackWriter<'_>, entry: usize, arg: usize) {
        writer.push(arg);
        writer.push(entry);
        context.sp = writer.stack_pointer() as u64;
        context.lr = trampoline_address() as u64;
    }
}

/// Address the first switch into a new thread returns to.
pub fn trampoline_address() -> usize {
    trampoline as usize
}

/// # Safety
/// See [`Arch::switch`].
#[unsafe(naked)]
unsafe extern "C" fn switch_context(_prev: *mut Aarch64Context, _next: *const Aarch64Context) {
    core::arch::naked_asm!(
        "mov x9, sp",
        "str x9, [x0, #0]",
        "stp x19, x20, [x0, #8]",
        "stp x21, x22, [x0, #24]",
        "stp x23, x24, [x0, #40]",
        "stp x25, x26, [x0, #56]",
        "stp x27, x28, [x0, #72]",
        "stp x29, x30, [x0, #88]",
        "stp d8, d9, [x0, #104]",
        "stp d10, d11, [x0, #120]",
        "stp d12, d13, [x0, #136]",
        "stp d14, d15, [x0, #152]",
        "mrs x9, fpcr",
        "str x9, [x0, #168]",
        "ldr x9, [x1, #0]",
        "mov sp, x9",
        "ldp x19, x20, [x1, #8]",
        "ldp x21, x22, [x1, #24]",
        "ldp x23, x24, [x1, #40]",
        "ldp x25, x26, [x1, #56]",
        "ldp x27, x28, [x1, #72]",
        "ldp x29, x30, [x1, #88]",
        "ldp d8, d9, [x1, #104]",
        "ldp d10, d11, [x1, #120]",
        "ldp d12, d13, [x1, #136]",
        "ldp d14, d15, [x1, #152]",
        "ldr x9, [x1, #168]",
        "msr fpcr, x9",
        "ret",
    );
}

/// First code a new thread executes; never returns.
#[unsafe(naked)]
unsafe extern "C" fn trampoline() -> ! {
    core::arch::naked_asm!(
        "ldp x0, x1, [sp], #16",
        "bl {entry}",
        "brk #0x1",
        entry = sym crate::scheduler::thread_entry,
    );
}
