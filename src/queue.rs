//! The ordered collection of threads that are not currently running.

use crate::thread::{Thread, ThreadId, ThreadState};
use std::collections::VecDeque;

/// Threads waiting for a kernel thread to run them, oldest first.
///
/// Never contains a `Running` thread: a thread is removed before it is
/// switched to and only re-enters once its switch-out has completed.
#[derive(Debug, Default)]
pub struct RunQueue {
    threads: VecDeque<Box<Thread>>,
}

impl RunQueue {
    pub const fn new() -> Self {
        Self {
            threads: VecDeque::new(),
        }
    }

    /// Newly spawned threads go to the front and win the next selection.
    pub fn push_front(&mut self, thread: Box<Thread>) {
        debug_assert_ne!(thread.state(), ThreadState::Running);
        self.threads.push_front(thread);
    }

    pub fn push_back(&mut self, thread: Box<Thread>) {
        debug_assert_ne!(thread.state(), ThreadState::Running);
        self.threads.push_back(thread);
    }

    /// Remove and return the first thread the caller may switch to.
    ///
    /// A thread qualifies if it is `Ready`, or `Waiting` when `only_ready` is
    /// false. Bootstrap threads only qualify for their own kernel thread,
    /// identified by `home`.
    pub fn take_next(&mut self, only_ready: bool, home: ThreadId) -> Option<Box<Thread>> {
        let index = self.threads.iter().position(|thread| {
            let schedulable = match thread.state() {
                ThreadState::Ready => true,
                ThreadState::Waiting => !only_ready,
                ThreadState::Running | ThreadState::Zombie => false,
            };
            schedulable && (!thread.is_bootstrap() || thread.id() == home)
        })?;
        self.threads.remove(index)
    }

    /// Remove every zombie, leaving the order of the others unchanged.
    ///
    /// The caller drops the returned threads, which frees their stacks.
    pub fn drain_zombies(&mut self) -> Vec<Box<Thread>> {
        if !self.threads.iter().any(|thread| thread.state() == ThreadState::Zombie) {
            return Vec::new();
        }
        let (zombies, live): (Vec<_>, Vec<_>) = self
            .threads
            .drain(..)
            .partition(|thread| thread.state() == ThreadState::Zombie);
        self.threads = live.into();
        zombies
    }

    /// `(non-zombie, zombie)` counts.
    pub fn counts(&self) -> (usize, usize) {
        let zombies = self
            .threads
            .iter()
            .filter(|thread| thread.state() == ThreadState::Zombie)
            .count();
        (self.threads.len() - zombies, zombies)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter().map(|thread| &**thread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::stack::Stack;

    fn worker(state: ThreadState) -> Box<Thread> {
        fn entry(_: usize) {}
        let mut thread = Thread::spawned(
            Stack::allocate(SchedulerConfig::MIN_STACK_SIZE, false),
            entry,
            0,
        );
        thread.set_state(state);
        thread
    }

    fn bootstrap(state: ThreadState) -> Box<Thread> {
        let mut thread = Thread::bootstrap();
        thread.set_state(state);
        thread
    }

    fn ids(queue: &RunQueue) -> Vec<ThreadId> {
        queue.iter().map(Thread::id).collect()
    }

    #[test]
    fn test_take_next_is_fifo() {
        let home = Thread::bootstrap().id();
        let mut queue = RunQueue::new();
        let a = worker(ThreadState::Ready);
        let b = worker(ThreadState::Ready);
        let (a_id, b_id) = (a.id(), b.id());
        queue.push_back(a);
        queue.push_back(b);

        assert_eq!(queue.take_next(false, home).map(|t| t.id()), Some(a_id));
        assert_eq!(queue.take_next(false, home).map(|t| t.id()), Some(b_id));
        assert!(queue.take_next(false, home).is_none());
    }

    #[test]
    fn test_push_front_wins() {
        let home = Thread::bootstrap().id();
        let mut queue = RunQueue::new();
        let old = worker(ThreadState::Ready);
        let new = worker(ThreadState::Ready);
        let new_id = new.id();
        queue.push_back(old);
        queue.push_front(new);

        assert_eq!(queue.take_next(false, home).map(|t| t.id()), Some(new_id));
    }

    #[test]
    fn test_only_ready_skips_waiting() {
        let home_thread = bootstrap(ThreadState::Waiting);
        let home = home_thread.id();
        let mut queue = RunQueue::new();
        queue.push_back(home_thread);
        queue.push_back(worker(ThreadState::Waiting));

        assert!(queue.take_next(true, home).is_none());
        assert_eq!(queue.len(), 2);

        let ready = worker(ThreadState::Ready);
        let ready_id = ready.id();
        queue.push_back(ready);
        assert_eq!(queue.take_next(true, home).map(|t| t.id()), Some(ready_id));
    }

    #[test]
    fn test_waiting_selected_when_allowed() {
        let home_thread = bootstrap(ThreadState::Waiting);
        let home = home_thread.id();
        let mut queue = RunQueue::new();
        queue.push_back(home_thread);

        assert_eq!(queue.take_next(false, home).map(|t| t.id()), Some(home));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_foreign_bootstrap_is_pinned() {
        let foreign = bootstrap(ThreadState::Ready);
        let foreign_id = foreign.id();
        let home = Thread::bootstrap().id();
        let mut queue = RunQueue::new();
        queue.push_back(foreign);

        assert!(queue.take_next(false, home).is_none());
        assert_eq!(queue.take_next(false, foreign_id).map(|t| t.id()), Some(foreign_id));
    }

    #[test]
    fn test_zombies_never_selected() {
        let home = Thread::bootstrap().id();
        let mut queue = RunQueue::new();
        queue.push_back(worker(ThreadState::Zombie));

        assert!(queue.take_next(false, home).is_none());
        assert_eq!(queue.counts(), (0, 1));
    }

    #[test]
    fn test_drain_zombies_keeps_order() {
        let mut queue = RunQueue::new();
        let a = worker(ThreadState::Ready);
        let b = worker(ThreadState::Waiting);
        let expected = vec![a.id(), b.id()];
        queue.push_back(worker(ThreadState::Zombie));
        queue.push_back(a);
        queue.push_back(worker(ThreadState::Zombie));
        queue.push_back(b);

        assert_eq!(queue.counts(), (2, 2));
        let zombies = queue.drain_zombies();
        assert_eq!(zombies.len(), 2);
        assert!(zombies.iter().all(|t| t.state() == ThreadState::Zombie));
        assert_eq!(ids(&queue), expected);
        assert_eq!(queue.counts(), (2, 0));
        assert!(queue.drain_zombies().is_empty());
    }
}
