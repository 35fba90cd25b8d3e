//! Process-wide scheduler counters.
//!
//! Counters are updated with relaxed atomics from every kernel thread; a
//! snapshot is therefore only exact while no other kernel thread schedules.

use portable_atomic::{AtomicU64, Ordering};

/// Live counters for the whole process.
pub struct SchedulerMetrics {
    threads_spawned: AtomicU64,
    context_switches: AtomicU64,
    failed_yields: AtomicU64,
    threads_reclaimed: AtomicU64,
    stacks_allocated: AtomicU64,
    stacks_released: AtomicU64,
}

/// Point-in-time copy of [`SchedulerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub threads_spawned: u64,
    pub context_switches: u64,
    pub failed_yields: u64,
    pub threads_reclaimed: u64,
    pub stacks_allocated: u64,
    pub stacks_released: u64,
}

pub static GLOBAL_METRICS: SchedulerMetrics = SchedulerMetrics::new();

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    pub const fn new() -> Self {
        Self {
            threads_spawned: AtomicU64::new(0),
            context_switches: AtomicU64::new(0),
            failed_yields: AtomicU64::new(0),
            threads_reclaimed: AtomicU64::new(0),
            stacks_allocated: AtomicU64::new(0),
            stacks_released: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_spawn(&self) {
        self.threads_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_switch(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_yield(&self) {
        self.failed_yields.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reclaimed(&self, count: usize) {
        self.threads_reclaimed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_stack_allocated(&self) {
        self.stacks_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stack_released(&self) {
        self.stacks_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            threads_spawned: self.threads_spawned.load(Ordering::Relaxed),
            context_switches: self.context_switches.load(Ordering::Relaxed),
            failed_yields: self.failed_yields.load(Ordering::Relaxed),
            threads_reclaimed: self.threads_reclaimed.load(Ordering::Relaxed),
            stacks_allocated: self.stacks_allocated.load(Ordering::Relaxed),
            stacks_released: self.stacks_released.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Stacks allocated but not yet released.
    pub fn live_stacks(&self) -> u64 {
        self.stacks_allocated.saturating_sub(self.stacks_released)
    }

    /// Counter deltas accumulated since `earlier`.
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            threads_spawned: self.threads_spawned.saturating_sub(earlier.threads_spawned),
            context_switches: self.context_switches.saturating_sub(earlier.context_switches),
            failed_yields: self.failed_yields.saturating_sub(earlier.failed_yields),
            threads_reclaimed: self.threads_reclaimed.saturating_sub(earlier.threads_reclaimed),
            stacks_allocated: self.stacks_allocated.saturating_sub(earlier.stacks_allocated),
            stacks_released: self.stacks_released.saturating_sub(earlier.stacks_released),
        }
    }
}
