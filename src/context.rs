//! Initial frame construction for freshly spawned threads.
//!
//! The stack is treated as a byte arena with a write cursor that starts at
//! the 16-byte aligned top and moves down one machine word per slot. All
//! address arithmetic lives here; the architecture layer only decides which
//! words go where.

use crate::arch::{Arch, Context, DefaultArch};
use crate::stack::STACK_ALIGN;
use crate::thread::ThreadFn;

const WORD: usize = core::mem::size_of::<usize>();

/// Downward-growing cursor over a stack region.
pub struct StackWriter<'a> {
    region: &'a mut [u8],
    /// Offset into `region` of the lowest written byte
    cursor: usize,
}

impl<'a> StackWriter<'a> {
    /// Start at the highest 16-byte aligned address inside `region`.
    pub fn new(region: &'a mut [u8]) -> Self {
        let base = region.as_ptr() as usize;
        let end = base + region.len();
        let top = end & !(STACK_ALIGN - 1);
        let cursor = top.saturating_sub(base);
        Self { region, cursor }
    }

    /// Move the cursor down one word and store `word` there.
    ///
    /// Panics if the region is exhausted.
    pub fn push(&mut self, word: usize) {
        assert!(self.cursor >= WORD, "stack region too small for initial frame");
        self.cursor -= WORD;
        self.region[self.cursor..self.cursor + WORD].copy_from_slice(&word.to_ne_bytes());
    }

    /// Address the cursor currently points at; this becomes the stack pointer.
    pub fn stack_pointer(&self) -> usize {
        self.region.as_ptr() as usize + self.cursor
    }

    /// Word stored `index` slots above the cursor.
    pub fn peek(&self, index: usize) -> Option<usize> {
        let start = self.cursor.checked_add(index.checked_mul(WORD)?)?;
        let bytes = self.region.get(start..start + WORD)?;
        let mut word = [0u8; WORD];
        word.copy_from_slice(bytes);
        Some(usize::from_ne_bytes(word))
    }
}

/// Lay out the first frame of a new thread in `region` and return the
/// context that enters `entry(arg)` through the trampoline on first switch.
pub fn build_initial_context(region: &mut [u8], entry: ThreadFn, arg: usize) -> Context {
    let mut context = Context::default();
    let mut writer = StackWriter::new(region);
    DefaultArch::prepare(&mut context, &mut writer, entry as usize, arg);
    context
}
