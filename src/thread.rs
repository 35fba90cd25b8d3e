//! Thread control blocks.

use crate::arch::Context;
use crate::context::build_initial_context;
use crate::stack::Stack;
use core::fmt;
use core::num::NonZeroU64;
use portable_atomic::{AtomicU64, Ordering};

/// Entry point of a logical thread. The argument is an opaque word chosen by
/// the spawner.
pub type ThreadFn = fn(usize);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for logical threads.
///
/// Ids are process-wide, assigned in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    fn next() -> Self {
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        match NonZeroU64::new(id) {
            Some(id) => Self(id),
            None => unreachable!("thread id counter wrapped"),
        }
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a logical thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Blocked; only picked by a yield that accepts waiting threads
    Waiting,
    /// Schedulable
    Ready,
    /// Executing on some kernel thread
    Running,
    /// Finished, waiting to be reclaimed
    Zombie,
}

impl ThreadState {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadState::Waiting => "waiting",
            ThreadState::Ready => "ready",
            ThreadState::Running => "running",
            ThreadState::Zombie => "zombie",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread control block.
///
/// Always handled as `Box<Thread>` so the saved context keeps a stable
/// address while ownership moves between the current slot and the queue.
pub struct Thread {
    id: ThreadId,
    state: ThreadState,
    context: Context,
    /// `None` for the bootstrap thread of a kernel thread
    stack: Option<Stack>,
}

impl Thread {
    /// The thread already executing on a kernel thread when it initializes
    /// the scheduler. It runs on the kernel thread's own stack.
    pub(crate) fn bootstrap() -> Box<Thread> {
        Box::new(Thread {
            id: ThreadId::next(),
            state: ThreadState::Waiting,
            context: Context::default(),
            stack: None,
        })
    }

    /// A new thread that will run `entry(arg)` on `stack` when first switched to.
    pub(crate) fn spawned(mut stack: Stack, entry: ThreadFn, arg: usize) -> Box<Thread> {
        let context = build_initial_context(stack.as_mut_slice(), entry, arg);
        Box::new(Thread {
            id: ThreadId::next(),
            state: ThreadState::Ready,
            context,
            stack: Some(stack),
        })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ThreadState) {
        self.state = state;
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn context_ptr(&mut self) -> *mut Context {
        &mut self.context
    }

    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }

    /// Bootstrap threads are pinned to the kernel thread that created them.
    pub fn is_bootstrap(&self) -> bool {
        self.stack.is_none()
    }

    pub fn write_debug<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        writeln!(out, "Thread {}: {}", self.id, self.state)?;
        match &self.stack {
            Some(stack) => writeln!(out, "\tStack: {:p}", stack.top())?,
            None => writeln!(out, "\tStack: (kernel thread)")?,
        }
        self.context.write_registers(out)
    }

    /// Dump id, state and saved registers to stderr.
    pub fn print_debug(&self) {
        let mut out = String::new();
        if self.write_debug(&mut out).is_ok() {
            eprint!("{}", out);
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("bootstrap", &self.is_bootstrap())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;

    fn dummy(_: usize) {}

    #[test]
    fn test_thread_ids_increase() {
        let a = Thread::bootstrap();
        let b = Thread::bootstrap();
        assert!(b.id() > a.id());
        assert_ne!(a.id().get(), 0);
    }

    #[test]
    fn test_bootstrap_thread() {
        let thread = Thread::bootstrap();
        assert_eq!(thread.state(), ThreadState::Waiting);
        assert!(thread.is_bootstrap());
        assert!(thread.stack().is_none());
    }

    #[test]
    fn test_spawned_thread() {
        let stack = Stack::allocate(SchedulerConfig::MIN_STACK_SIZE, false);
        let top = stack.top() as u64;
        let thread = Thread::spawned(stack, dummy, 42);

        assert_eq!(thread.state(), ThreadState::Ready);
        assert!(!thread.is_bootstrap());
        let sp = thread.context().stack_pointer();
        assert!(sp < top && top - sp <= 64);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ThreadState::Waiting.to_string(), "waiting");
        assert_eq!(ThreadState::Ready.to_string(), "ready");
        assert_eq!(ThreadState::Running.to_string(), "running");
        assert_eq!(ThreadState::Zombie.to_string(), "zombie");
    }

    #[test]
    fn test_write_debug() {
        let mut thread = Thread::bootstrap();
        thread.set_state(ThreadState::Running);
        let mut out = String::new();
        thread.write_debug(&mut out).unwrap();

        assert!(out.starts_with(&format!("Thread {}: running\n", thread.id())));
        assert!(out.contains("\tStack: (kernel thread)\n"));
    }
}
