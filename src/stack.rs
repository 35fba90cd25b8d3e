//! Owned stack memory for spawned logical threads.
//!
//! On Unix the region is mapped with `mmap`, optionally with an inaccessible
//! guard page below the usable area so an overflow faults instead of
//! scribbling over a neighbouring allocation. Elsewhere the global allocator
//! provides a 16-byte aligned block.

use crate::metrics::GLOBAL_METRICS;
use core::ptr::NonNull;

/// Alignment of the stack top required by both supported ABIs.
pub const STACK_ALIGN: usize = 16;

/// A stack region owned by exactly one thread control block.
///
/// The memory is released exactly once, when the `Stack` is dropped.
pub struct Stack {
    /// Lowest address of the whole reservation (guard page included)
    base: NonNull<u8>,
    /// Bytes reserved, guard page included
    reserved: usize,
    /// Bytes below the guard page, excluded from the usable area
    guard: usize,
}

// The region is plain memory exclusively owned by this handle.
unsafe impl Send for Stack {}

impl Stack {
    /// Allocate a stack with at least `size` usable bytes.
    ///
    /// There is no recovery from a failed allocation: the process aborts.
    pub fn allocate(size: usize, guard_page: bool) -> Stack {
        let stack = imp::allocate(size, guard_page);
        GLOBAL_METRICS.record_stack_allocated();
        stack
    }

    /// Usable size in bytes.
    pub fn size(&self) -> usize {
        self.reserved - self.guard
    }

    pub fn has_guard_page(&self) -> bool {
        self.guard != 0
    }

    /// Lowest usable address.
    pub fn bottom(&self) -> *mut u8 {
        // SAFETY: `guard` is within the reservation.
        unsafe { self.base.as_ptr().add(self.guard) }
    }

    /// One past the highest usable address; stacks grow down from here.
    pub fn top(&self) -> *mut u8 {
        // SAFETY: `reserved` is the length of the reservation.
        unsafe { self.base.as_ptr().add(self.reserved) }
    }

    /// The usable region as bytes, for laying out the initial frame.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the usable region is mapped read/write and owned by `self`.
        unsafe { core::slice::from_raw_parts_mut(self.bottom(), self.size()) }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // SAFETY: `base`/`reserved` describe the reservation made in `allocate`.
        unsafe { imp::release(self.base, self.reserved) };
        GLOBAL_METRICS.record_stack_released();
    }
}

impl core::fmt::Debug for Stack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("top", &self.top())
            .field("guard_page", &self.has_guard_page())
            .finish()
    }
}

fn allocation_failed(size: usize) -> ! {
    log::error!("failed to allocate a {} byte thread stack", size);
    eprintln!("fatal: failed to allocate a {} byte thread stack", size);
    std::process::abort()
}

#[cfg(unix)]
mod imp {
    use super::{allocation_failed, Stack};
    use core::ptr::{self, NonNull};

    fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page <= 0 {
            4096
        } else {
            page as usize
        }
    }

    pub(super) fn allocate(size: usize, guard_page: bool) -> Stack {
        let page = page_size();
        let usable = match size.checked_add(page - 1) {
            Some(padded) => padded & !(page - 1),
            None => allocation_failed(size),
        };
        let guard = if guard_page { page } else { 0 };
        let reserved = match usable.checked_add(guard) {
            Some(reserved) => reserved,
            None => allocation_failed(size),
        };

        // SAFETY: anonymous private mapping, no file descriptor involved.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                reserved,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            allocation_failed(size);
        }

        if guard_page {
            // SAFETY: the first page lies inside the mapping created above.
            if unsafe { libc::mprotect(base, guard, libc::PROT_NONE) } != 0 {
                // SAFETY: unmapping the region we just mapped.
                unsafe { libc::munmap(base, reserved) };
                allocation_failed(size);
            }
        }

        match NonNull::new(base.cast::<u8>()) {
            Some(base) => Stack { base, reserved, guard },
            None => allocation_failed(size),
        }
    }

    pub(super) unsafe fn release(base: NonNull<u8>, reserved: usize) {
        // SAFETY: caller passes a mapping produced by `allocate`.
        if unsafe { libc::munmap(base.as_ptr().cast(), reserved) } != 0 {
            log::error!("munmap of thread stack at {:p} failed", base);
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::{allocation_failed, Stack, STACK_ALIGN};
    use core::ptr::NonNull;
    use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};

    pub(super) fn allocate(size: usize, _guard_page: bool) -> Stack {
        let reserved = (size + STACK_ALIGN - 1) & !(STACK_ALIGN - 1);
        let layout = match Layout::from_size_align(reserved, STACK_ALIGN) {
            Ok(layout) => layout,
            Err(_) => allocation_failed(size),
        };
        // SAFETY: layout has non-zero size.
        let base = unsafe { alloc(layout) };
        match NonNull::new(base) {
            Some(base) => Stack { base, reserved, guard: 0 },
            None => handle_alloc_error(layout),
        }
    }

    pub(super) unsafe fn release(base: NonNull<u8>, reserved: usize) {
        // SAFETY: `allocate` built this exact layout successfully.
        unsafe {
            dealloc(
                base.as_ptr(),
                Layout::from_size_align_unchecked(reserved, STACK_ALIGN),
            )
        };
    }
}
