//! Several kernel threads scheduling against the shared queue.

mod common;

use common::serial;
use cooperative_threads::{current_id, initialize, spawn, thread_count, wait, yield_now};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KERNEL_THREADS: usize = 5;

struct LazyValue {
    ready: bool,
    value: String,
    initializations: usize,
}

#[test]
fn test_lazy_initialization_across_kernel_threads() {
    let _serial = serial();
    let data = Arc::new(Mutex::new(LazyValue {
        ready: false,
        value: "<uninitialized>".to_string(),
        initializations: 0,
    }));
    let reads = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..KERNEL_THREADS)
        .map(|n| {
            let data = Arc::clone(&data);
            let reads = Arc::clone(&reads);
            std::thread::spawn(move || {
                initialize();
                spawn(move || {
                    let mut guard = data.lock().unwrap();
                    if !guard.ready {
                        std::thread::sleep(Duration::from_micros(500));
                        guard.value = format!("Hello from thread {}", n);
                        guard.ready = true;
                        guard.initializations += 1;
                    }
                    reads.lock().unwrap().push(guard.value.clone());
                });
                wait();
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let data = data.lock().unwrap();
    assert!(data.ready);
    assert_eq!(data.initializations, 1);
    let reads = reads.lock().unwrap();
    assert_eq!(reads.len(), KERNEL_THREADS);
    assert!(reads.iter().all(|value| *value == data.value));
    assert_eq!(thread_count(), (0, 0));
}

#[test]
fn test_bootstrap_threads_stay_pinned() {
    const WORKERS: usize = 8;
    const ROUNDS: usize = 50;

    let _serial = serial();
    let total = Arc::new(AtomicUsize::new(0));

    let kernel_threads: Vec<_> = (0..4)
        .map(|_| {
            let total = Arc::clone(&total);
            std::thread::spawn(move || {
                let os_thread = std::thread::current().id();
                initialize();
                let bootstrap = current_id();

                for _ in 0..WORKERS {
                    let total = Arc::clone(&total);
                    spawn(move || {
                        for _ in 0..ROUNDS {
                            total.fetch_add(1, Ordering::SeqCst);
                            yield_now();
                        }
                    });
                    assert_eq!(std::thread::current().id(), os_thread);
                }
                wait();

                assert_eq!(std::thread::current().id(), os_thread);
                assert_eq!(current_id(), bootstrap);
            })
        })
        .collect();

    for kernel_thread in kernel_threads {
        kernel_thread.join().unwrap();
    }

    assert_eq!(total.load(Ordering::SeqCst), 4 * WORKERS * ROUNDS);
    assert_eq!(thread_count(), (0, 0));
}
