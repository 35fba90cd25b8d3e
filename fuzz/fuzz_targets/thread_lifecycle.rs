#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use cooperative_threads::{
    collect_garbage, initialize, is_initialized, spawn, thread_count, wait, yield_thread,
    ThreadState,
};
use libfuzzer_sys::fuzz_target;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Arbitrary)]
enum ThreadOperation {
    /// Spawn a thread that yields this many times (mod 16) before exiting
    Spawn(u8),
    Yield { only_ready: bool },
    Wait,
    Count,
    Collect,
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);

    let operations: Result<Vec<ThreadOperation>, _> = (0..64)
        .map(|_| ThreadOperation::arbitrary(&mut u))
        .collect();

    if let Ok(ops) = operations {
        fuzz_thread_lifecycle(ops);
    }
});

fn fuzz_thread_lifecycle(operations: Vec<ThreadOperation>) {
    if !is_initialized() {
        initialize();
    }

    let finished = Arc::new(AtomicUsize::new(0));
    let mut spawned = 0;

    for op in operations {
        match op {
            ThreadOperation::Spawn(yields) => {
                let finished = Arc::clone(&finished);
                spawn(move || {
                    for _ in 0..(yields % 16) {
                        yield_thread(false);
                    }
                    finished.fetch_add(1, Ordering::SeqCst);
                });
                spawned += 1;
            }
            ThreadOperation::Yield { only_ready } => {
                yield_thread(only_ready);
            }
            ThreadOperation::Wait => {
                wait();
                assert_eq!(finished.load(Ordering::SeqCst), spawned);
                assert_eq!(cooperative_threads::current_state(), Some(ThreadState::Waiting));
            }
            ThreadOperation::Count => {
                let (active, zombie) = thread_count();
                assert!(active <= spawned);
                assert_eq!(zombie, 0);
            }
            ThreadOperation::Collect => {
                assert_eq!(collect_garbage(), 0);
            }
        }
    }

    wait();
    assert_eq!(finished.load(Ordering::SeqCst), spawned);
    assert_eq!(thread_count(), (0, 0));
}
