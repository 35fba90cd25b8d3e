//! The cooperative scheduler.
//!
//! One process-wide run queue is shared by every kernel thread that has
//! called [`initialize`]. Each kernel thread additionally owns, in
//! thread-local storage, the logical thread it is currently running and the
//! id of its bootstrap thread.
//!
//! A logical thread is only ever suspended inside [`yield_thread`]. The
//! previous thread is not put back on the queue until the switch that
//! suspends it has finished saving its registers: it is parked in a
//! kernel-thread-local slot, and whoever runs next on that kernel thread
//! publishes it (see [`finish_switch`]). Until then no other kernel thread
//! can resume it, and a zombie's stack cannot be freed while it is still
//! executing its final switch.
//!
//! After a switch returns, execution may be on a different kernel thread
//! than before it. Thread-local state is therefore only touched through
//! `#[inline(never)]` functions so its address is never cached across a
//! switch.

use crate::arch::{Arch, Context, DefaultArch};
use crate::config::SchedulerConfig;
use crate::error::{ThreadError, ThreadResult};
use crate::metrics::GLOBAL_METRICS;
use crate::queue::RunQueue;
use crate::stack::Stack;
use crate::thread::{Thread, ThreadFn, ThreadId, ThreadState};
use core::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

/// Process-wide scheduling state.
pub struct Scheduler {
    queue: spin::Mutex<RunQueue>,
}

pub static SCHEDULER: Scheduler = Scheduler::new();

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            queue: spin::Mutex::new(RunQueue::new()),
        }
    }

    /// `(non-zombie, zombie)` threads currently queued.
    pub fn thread_count(&self) -> (usize, usize) {
        self.queue.lock().counts()
    }

    /// Write a debug dump of every queued thread.
    pub fn write_queue<W: core::fmt::Write>(&self, out: &mut W) -> core::fmt::Result {
        let queue = self.queue.lock();
        for thread in queue.iter() {
            thread.write_debug(out)?;
        }
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-kernel-thread scheduling state.
struct KernelThread {
    /// The logical thread running on this kernel thread
    current: RefCell<Option<Box<Thread>>>,
    /// The thread switched away from, until its switch completes
    parked: RefCell<Option<Box<Thread>>>,
    /// Bootstrap thread id; `None` until initialized
    home: Cell<Option<ThreadId>>,
    config: Cell<SchedulerConfig>,
}

impl KernelThread {
    const fn new() -> Self {
        Self {
            current: RefCell::new(None),
            parked: RefCell::new(None),
            home: Cell::new(None),
            config: Cell::new(SchedulerConfig::DEFAULT),
        }
    }
}

thread_local! {
    static KERNEL_THREAD: KernelThread = const { KernelThread::new() };
}

/// Abort on a broken scheduler invariant; nothing can be trusted afterwards.
#[cold]
fn invariant_violation(what: &str) -> ! {
    log::error!("scheduler invariant violated: {}", what);
    eprintln!("fatal: scheduler invariant violated: {}", what);
    std::process::abort()
}

/// Initialize the calling kernel thread with the default configuration.
///
/// The code already running becomes this kernel thread's bootstrap thread.
///
/// # Panics
///
/// Panics if the kernel thread was already initialized.
pub fn initialize() {
    if let Err(err) = initialize_with(SchedulerConfig::default()) {
        panic!("{}", err);
    }
}

/// Initialize the calling kernel thread with `config`.
pub fn initialize_with(config: SchedulerConfig) -> ThreadResult<()> {
    config.validate()?;
    KERNEL_THREAD.with(|kernel| {
        if kernel.home.get().is_some() {
            return Err(ThreadError::AlreadyInitialized);
        }
        let thread = Thread::bootstrap();
        log::debug!(
            "thread {} bootstraps kernel thread {:?}",
            thread.id(),
            std::thread::current().id()
        );
        kernel.home.set(Some(thread.id()));
        kernel.config.set(config);
        *kernel.current.borrow_mut() = Some(thread);
        Ok(())
    })
}

/// Whether the calling kernel thread has been initialized.
pub fn is_initialized() -> bool {
    KERNEL_THREAD.with(|kernel| kernel.home.get().is_some())
}

/// Configuration the calling kernel thread was initialized with.
pub fn config() -> ThreadResult<SchedulerConfig> {
    KERNEL_THREAD.with(|kernel| match kernel.home.get() {
        Some(_) => Ok(kernel.config.get()),
        None => Err(ThreadError::NotInitialized),
    })
}

#[inline(never)]
fn home_thread() -> ThreadId {
    match KERNEL_THREAD.with(|kernel| kernel.home.get()) {
        Some(home) => home,
        None => panic!("{}", ThreadError::NotInitialized),
    }
}

/// Run `entry(arg)` as a new logical thread.
///
/// The new thread is placed at the front of the queue and the caller yields
/// immediately, so it normally starts before this returns. Returns once the
/// caller is scheduled again.
///
/// # Panics
///
/// Panics if the calling kernel thread was not initialized.
pub fn spawn_fn(entry: ThreadFn, arg: usize) {
    home_thread();
    let config = KERNEL_THREAD.with(|kernel| kernel.config.get());
    let thread = Thread::spawned(Stack::allocate(config.stack_size, config.guard_page), entry, arg);
    log::debug!("spawned thread {}", thread.id());
    SCHEDULER.queue.lock().push_front(thread);
    GLOBAL_METRICS.record_spawn();
    // Another kernel thread may already have taken the new thread; either
    // way this is a scheduling point.
    yield_thread(false);
}

type BoxedFn = Box<dyn FnOnce() + Send + 'static>;

fn run_boxed(arg: usize) {
    // SAFETY: `spawn` passes a pointer from `Box::into_raw`, consumed once here.
    let f = unsafe { Box::from_raw(arg as *mut BoxedFn) };
    f();
}

/// Run the closure `f` as a new logical thread; see [`spawn_fn`].
///
/// The closure may be resumed on any initialized kernel thread, hence `Send`.
pub fn spawn<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    home_thread();
    let boxed: Box<BoxedFn> = Box::new(Box::new(f));
    spawn_fn(run_boxed, Box::into_raw(boxed) as usize);
}

/// Switch to another logical thread if one is eligible.
///
/// Picks the oldest queued thread that is `Ready`, or `Ready`/`Waiting` when
/// `only_ready` is false, skipping bootstrap threads of other kernel
/// threads. Returns `false` without touching any state if there is none;
/// otherwise returns `true` once the caller is scheduled again.
///
/// # Panics
///
/// Panics if the calling kernel thread was not initialized.
#[inline(never)]
pub fn yield_thread(only_ready: bool) -> bool {
    let home = home_thread();
    let next = SCHEDULER.queue.lock().take_next(only_ready, home);
    let Some(next) = next else {
        GLOBAL_METRICS.record_failed_yield();
        return false;
    };

    let (prev_context, next_context) = KERNEL_THREAD.with(|kernel| hand_over(kernel, next));
    GLOBAL_METRICS.record_switch();
    // SAFETY: both contexts live in boxed TCBs owned by this kernel thread's
    // slots until `finish_switch` runs, and no lock is held.
    unsafe { DefaultArch::switch(prev_context, next_context) };
    finish_switch();
    true
}

/// Make `next` current and park the previous thread.
fn hand_over(kernel: &KernelThread, mut next: Box<Thread>) -> (*mut Context, *const Context) {
    let Some(mut prev) = kernel.current.borrow_mut().take() else {
        invariant_violation("yield without a current thread");
    };
    if next.state() == ThreadState::Zombie {
        invariant_violation("zombie thread selected to run");
    }
    if prev.state() == ThreadState::Running {
        prev.set_state(ThreadState::Ready);
    }
    next.set_state(ThreadState::Running);
    log::trace!("switch {} ({}) -> {}", prev.id(), prev.state(), next.id());

    let prev_context = prev.context_ptr();
    let next_context = next.context_ptr() as *const Context;

    let mut parked = kernel.parked.borrow_mut();
    if parked.is_some() {
        invariant_violation("previous switch was never completed");
    }
    *parked = Some(prev);
    *kernel.current.borrow_mut() = Some(next);
    (prev_context, next_context)
}

/// Runs on the thread that was just switched to: publish the parked thread
/// at the back of the queue, then reclaim zombies.
#[inline(never)]
fn finish_switch() {
    let parked = KERNEL_THREAD.with(|kernel| kernel.parked.borrow_mut().take());
    if let Some(prev) = parked {
        SCHEDULER.queue.lock().push_back(prev);
    }
    collect_garbage();
}

/// Remove every zombie from the queue and free it, returning how many were
/// reclaimed. Stacks are released after the queue lock is dropped.
pub fn collect_garbage() -> usize {
    let zombies = SCHEDULER.queue.lock().drain_zombies();
    let reclaimed = zombies.len();
    if reclaimed > 0 {
        log::trace!("reclaimed {} zombie threads", reclaimed);
        GLOBAL_METRICS.record_reclaimed(reclaimed);
    }
    drop(zombies);
    reclaimed
}

/// Block until no `Ready` thread is reachable from this kernel thread.
///
/// The caller marks itself `Waiting` and keeps yielding to ready threads;
/// it re-marks itself after every resumption so it never looks ready to
/// itself.
pub fn wait() {
    set_current_state(ThreadState::Waiting);
    while yield_thread(true) {
        set_current_state(ThreadState::Waiting);
    }
}

/// Yield to any eligible thread, `Waiting` ones included.
pub fn yield_now() -> bool {
    yield_thread(false)
}

#[inline(never)]
fn set_current_state(state: ThreadState) {
    KERNEL_THREAD.with(|kernel| match kernel.current.borrow_mut().as_mut() {
        Some(thread) => thread.set_state(state),
        None => invariant_violation("no current thread"),
    });
}

/// `(active, zombie)` threads in the queue. The calling thread is never
/// counted since it is not queued while it runs.
pub fn thread_count() -> (usize, usize) {
    SCHEDULER.thread_count()
}

/// Id of the logical thread running on this kernel thread.
#[inline(never)]
pub fn current_id() -> Option<ThreadId> {
    KERNEL_THREAD.with(|kernel| kernel.current.borrow().as_ref().map(|thread| thread.id()))
}

#[inline(never)]
pub fn current_state() -> Option<ThreadState> {
    KERNEL_THREAD.with(|kernel| kernel.current.borrow().as_ref().map(|thread| thread.state()))
}

/// Debug dump of the current thread, as written by [`print_debug`].
#[inline(never)]
pub fn debug_string() -> Option<String> {
    KERNEL_THREAD.with(|kernel| {
        let current = kernel.current.borrow();
        let thread = current.as_ref()?;
        let mut out = String::new();
        thread.write_debug(&mut out).ok()?;
        Some(out)
    })
}

/// Dump the current thread's id, state and saved registers to stderr.
pub fn print_debug() {
    if let Some(dump) = debug_string() {
        eprint!("{}", dump);
    }
}

/// Entry routine of every spawned thread, called by the trampoline.
///
/// Runs the user function, then turns the thread into a zombie and yields
/// for the last time.
pub(crate) extern "C" fn thread_entry(entry: usize, arg: usize) -> ! {
    finish_switch();

    // SAFETY: the trampoline passes back the `ThreadFn` stored by `Thread::spawned`.
    let entry = unsafe { core::mem::transmute::<usize, ThreadFn>(entry) };
    if panic::catch_unwind(AssertUnwindSafe(|| entry(arg))).is_err() {
        invariant_violation("logical thread panicked");
    }

    set_current_state(ThreadState::Zombie);
    log::trace!("thread exiting");
    yield_thread(false);
    invariant_violation("zombie thread resumed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_kernel_thread() {
        std::thread::spawn(|| {
            assert!(!is_initialized());
            assert_eq!(config(), Err(ThreadError::NotInitialized));
            assert!(current_id().is_none());
            assert!(debug_string().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_initialize_twice_fails() {
        std::thread::spawn(|| {
            let config = SchedulerConfig::new().with_stack_size(64 * 1024);
            initialize_with(config).unwrap();
            assert!(is_initialized());
            assert_eq!(crate::scheduler::config(), Ok(config));
            assert_eq!(current_state(), Some(ThreadState::Waiting));
            assert_eq!(initialize_with(config), Err(ThreadError::AlreadyInitialized));
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        std::thread::spawn(|| {
            let config = SchedulerConfig::new().with_stack_size(1);
            assert!(matches!(initialize_with(config), Err(ThreadError::StackTooSmall { .. })));
            assert!(!is_initialized());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_yield_panics_before_initialize() {
        let result = std::thread::spawn(|| yield_now()).join();
        assert!(result.is_err());
    }
}
