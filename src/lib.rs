//! Cooperative user-level threads.
//!
//! Many logical threads are multiplexed onto one or more kernel threads.
//! Switches happen only when a logical thread yields, spawns, waits or
//! returns; there is no preemption, and a blocking system call blocks every
//! logical thread on the same kernel thread.
//!
//! ```no_run
//! use cooperative_threads::{initialize, spawn, wait, yield_now};
//!
//! initialize();
//! spawn(|| {
//!     println!("first half");
//!     yield_now();
//!     println!("second half");
//! });
//! wait();
//! ```

pub mod arch;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod scheduler;
pub mod stack;
pub mod thread;

pub use config::SchedulerConfig;
pub use error::{ThreadError, ThreadResult};
pub use metrics::{MetricsSnapshot, GLOBAL_METRICS};
pub use scheduler::{
    collect_garbage, current_id, current_state, debug_string, initialize, initialize_with,
    is_initialized, print_debug, spawn, spawn_fn, thread_count, wait, yield_now, yield_thread,
    Scheduler, SCHEDULER,
};
pub use thread::{Thread, ThreadFn, ThreadId, ThreadState};
