//! Architecture abstraction layer for context switching.
//!
//! Each supported architecture provides a saved-register [`Arch::Context`],
//! the switch primitive, and the layout of the first frame a new thread
//! starts from. The rest of the crate only talks to [`DefaultArch`].

use crate::context::StackWriter;

/// Architecture abstraction trait.
///
/// # Safety
///
/// Implementations are raw register manipulation. The switch primitive is
/// the only place in the crate where a logical thread is suspended.
pub trait Arch {
    /// Register state needed to suspend and later resume a logical thread.
    type Context: Default + Send + core::fmt::Debug;

    /// Save the callee-saved registers, stack pointer and floating-point
    /// control state into `prev`, then load them from `next` and continue
    /// wherever `next` was suspended (or at the trampoline for a new thread).
    ///
    /// Returns only when some later switch targets `prev` again.
    ///
    /// # Safety
    ///
    /// - `prev` must be valid for writes and `next` valid for reads
    /// - `next` must hold a context produced by a previous switch or by
    ///   [`Arch::prepare`], whose stack is still alive
    /// - no lock may be held across the call
    unsafe fn switch(prev: *mut Self::Context, next: *const Self::Context);

    /// Write the first frame of a thread that will run `entry(arg)` and point
    /// `context` at it.
    fn prepare(context: &mut Self::Context, writer: &mut StackWriter<'_>, entry: usize, arg: usize);
}

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(target_arch = "x86_64")]
pub use self::x86_64::{trampoline_address, X86_64Arch as DefaultArch, X86_64Context as Context};

#[cfg(target_arch = "aarch64")]
pub use self::aarch64::{trampoline_address, Aarch64Arch as DefaultArch, Aarch64Context as Context};

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("cooperative-threads supports only x86_64 and aarch64 targets");
