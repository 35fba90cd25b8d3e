//! x86_64 architecture implementation (System V ABI).

use super::Arch;
use crate::context::StackWriter;
use core::fmt;

/// Default SSE control/status: all exceptions masked, round to nearest.
pub const DEFAULT_MXCSR: u32 = 0x1F80;
/// Default x87 control word: all exceptions masked, 64-bit precision.
pub const DEFAULT_X87_CW: u16 = 0x037F;

/// x86_64 architecture implementation.
pub struct X86_64Arch;

/// x86_64 saved context.
///
/// Only callee-saved state is stored; the switch is an ordinary call, so
/// the compiler already treats every caller-saved register as clobbered.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X86_64Context {
    pub rsp: u64,
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub mxcsr: u32,
    pub x87_cw: u16,
}

// Offsets hard-coded in `switch_context`.
const _: () = {
    assert!(core::mem::offset_of!(X86_64Context, rsp) == 0x00);
    assert!(core::mem::offset_of!(X86_64Context, rbp) == 0x30);
    assert!(core::mem::offset_of!(X86_64Context, mxcsr) == 0x38);
    assert!(core::mem::offset_of!(X86_64Context, x87_cw) == 0x3C);
};

impl Default for X86_64Context {
    fn default() -> Self {
        Self {
            rsp: 0,
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            mxcsr: DEFAULT_MXCSR,
            x87_cw: DEFAULT_X87_CW,
        }
    }
}

impl X86_64Context {
    pub fn stack_pointer(&self) -> u64 {
        self.rsp
    }

    /// Human-readable register dump, one register per line.
    pub fn write_registers<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "\tRSP: {:#x}", self.rsp)?;
        writeln!(out, "\tR15: {:#x}", self.r15)?;
        writeln!(out, "\tR14: {:#x}", self.r14)?;
        writeln!(out, "\tR13: {:#x}", self.r13)?;
        writeln!(out, "\tR12: {:#x}", self.r12)?;
        writeln!(out, "\tRBX: {:#x}", self.rbx)?;
        writeln!(out, "\tRBP: {:#x}", self.rbp)?;
        writeln!(out, "\tMXCSR: {:#x}", self.mxcsr)?;
        writeln!(out, "\tx87: {:#x}", self.x87_cw)
    }
}

impl Arch for X86_64Arch {
    type Context = X86_64Context;

    unsafe fn switch(prev: *mut Self::Context, next: *const Self::Context) {
        unsafe { switch_context(prev, next) }
    }

    /// Frame, from the aligned top down:
    ///
    /// ```text
    ///   top (16-byte aligned)
    ///   arg
    ///   entry
    ///   trampoline   <- rsp
    /// ```
    ///
    /// The switch `ret`s into the trampoline, which pops `entry` and `arg`
    /// into the first two argument registers. The stack is then back at the
    /// aligned top, so the `call` into the entry routine leaves it correctly
    /// misaligned by one return address, as the ABI expects.
    fn prepare(context: &mut Self::Context, writer: &mut StackWriter<'_>, entry: usize, arg: usize) {
        writer.push(arg);
        writer.push(entry);
        writer.push(trampoline_address());
        context.rsp = writer.stack_pointer() as u64;
    }
}

/// Address the first switch into a new thread returns to.
pub fn trampoline_address() -> usize {
    trampoline as usize
}

/// # Safety
/// See [`Arch::switch`].
#[unsafe(naked)]
unsafe extern "C" fn switch_context(_prev: *mut X86_64Context, _next: *const X86_64Context) {
    core::arch::naked_asm!(
        "mov qword ptr [rdi + 0x00], rsp",
        "mov qword ptr [rdi + 0x08], r15",
        "mov qword ptr [rdi + 0x10], r14",
        "mov qword ptr [rdi + 0x18], r13",
        "mov qword ptr [rdi + 0x20], r12",
        "mov qword ptr [rdi + 0x28], rbx",
        "mov qword ptr [rdi + 0x30], rbp",
        "stmxcsr dword ptr [rdi + 0x38]",
        "fnstcw word ptr [rdi + 0x3c]",
        "mov rsp, qword ptr [rsi + 0x00]",
        "mov r15, qword ptr [rsi + 0x08]",
        "mov r14, qword ptr [rsi + 0x10]",
        "mov r13, qword ptr [rsi + 0x18]",
        "mov r12, qword ptr [rsi + 0x20]",
        "mov rbx, qword ptr [rsi + 0x28]",
        "mov rbp, qword ptr [rsi + 0x30]",
        "ldmxcsr dword ptr [rsi + 0x38]",
        "fldcw word ptr [rsi + 0x3c]",
        "ret",
    );
}

/// First code a new thread executes; never returns.
#[unsafe(naked)]
unsafe extern "C" fn trampoline() -> ! {
    core::arch::naked_asm!(
        "pop rdi",
        "pop rsi",
        "call {entry}",
        "ud2",
        entry = sym crate::scheduler::thread_entry,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let context = X86_64Context::default();
        assert_eq!(context.rsp, 0);
        assert_eq!(context.mxcsr, 0x1F80);
        assert_eq!(context.x87_cw, 0x037F);
    }

    #[test]
    fn test_register_dump() {
        let mut context = X86_64Context::default();
        context.r12 = 0x12;
        context.r13 = 0x13;
        let mut out = String::new();
        context.write_registers(&mut out).unwrap();
        assert!(out.contains("\tR12: 0x12\n"));
        assert!(out.contains("\tR13: 0x13\n"));
        assert!(out.contains("\tMXCSR: 0x1f80\n"));
    }
}
