//! Several kernel threads, each running its own scheduler against the shared
//! queue. Every kernel thread spawns one logical thread; the first one to get
//! the lock fills in a shared value and all of them read it.
//!
//! Set `LOG=debug` (or `trace`) to watch the scheduler.

use cooperative_threads::{initialize_with, spawn, wait, SchedulerConfig, GLOBAL_METRICS};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KERNEL_THREADS: usize = 5;

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        eprintln!(
            "[\x1b[{}m{:<5}\x1b[0m {:?}] {}",
            level_color(record.level()),
            record.level(),
            std::thread::current().id(),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn level_color(level: Level) -> u8 {
    match level {
        Level::Error => 31,
        Level::Warn => 93,
        Level::Info => 34,
        Level::Debug => 32,
        Level::Trace => 90,
    }
}

fn init_logger() {
    static LOGGER: StderrLogger = StderrLogger;
    if log::set_logger(&LOGGER).is_err() {
        return;
    }
    log::set_max_level(match std::env::var("LOG").as_deref() {
        Ok("error") => LevelFilter::Error,
        Ok("warn") => LevelFilter::Warn,
        Ok("info") => LevelFilter::Info,
        Ok("debug") => LevelFilter::Debug,
        Ok("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    });
}

struct ExampleData {
    is_ready: bool,
    value: String,
}

fn main() {
    init_logger();

    let config = match SchedulerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {}", err);
            std::process::exit(2);
        }
    };

    let data = Arc::new(Mutex::new(ExampleData {
        is_ready: false,
        value: "<uninitialized>".to_string(),
    }));

    let threads: Vec<_> = (0..KERNEL_THREADS)
        .map(|n| {
            let data = Arc::clone(&data);
            std::thread::spawn(move || {
                if let Err(err) = initialize_with(config) {
                    eprintln!("kernel thread {}: {}", n, err);
                    return;
                }
                spawn(move || {
                    println!("Reader writer thread {} starts running.", n);
                    let mut guard = match data.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    if !guard.is_ready {
                        std::thread::sleep(Duration::from_micros(500));
                        guard.value = format!("Hello from thread {}", n);
                        guard.is_ready = true;
                        println!("example data is initialized by thread {}", n);
                    }
                    println!("The value read is {} by thread {}", guard.value, n);
                });
                wait();
                println!("Finished kernel thread {}", n);
            })
        })
        .collect();

    for thread in threads {
        if thread.join().is_err() {
            eprintln!("a kernel thread panicked");
        }
    }

    let metrics = GLOBAL_METRICS.snapshot();
    println!(
        "spawned {} threads, {} context switches, {} reclaimed",
        metrics.threads_spawned, metrics.context_switches, metrics.threads_reclaimed
    );
}
