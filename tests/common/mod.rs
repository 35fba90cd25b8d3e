//! Shared helpers for integration tests.
//!
//! The run queue is process-wide, so tests inside one binary must not
//! schedule concurrently or they would run each other's threads.

#![allow(dead_code)]

use cooperative_threads::{initialize_with, thread_count, SchedulerConfig};
use std::sync::{Mutex, MutexGuard, PoisonError};

static SERIAL: Mutex<()> = Mutex::new(());

/// Hold for the duration of a test that touches the scheduler.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` on a fresh kernel thread initialized with the default config.
pub fn run_isolated<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    run_isolated_with(SchedulerConfig::default(), f)
}

/// Run `f` on a fresh kernel thread initialized with `config`, then check
/// that it left nothing behind in the queue.
pub fn run_isolated_with<T, F>(config: SchedulerConfig, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let _serial = serial();
    let result = std::thread::spawn(move || {
        initialize_with(config).expect("kernel thread initializes");
        f()
    })
    .join();
    match result {
        Ok(value) => {
            assert_eq!(thread_count(), (0, 0), "test left threads in the queue");
            value
        }
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
