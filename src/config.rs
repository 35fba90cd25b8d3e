//! Per-kernel-thread scheduler configuration.

use crate::error::{ThreadError, ThreadResult};

/// Environment variable holding the stack size in bytes (`k`/`m` suffixes allowed).
pub const STACK_SIZE_ENV: &str = "COOP_THREADS_STACK_SIZE";
/// Environment variable toggling the guard page (`0`, `1`, `true`, `false`).
pub const GUARD_PAGE_ENV: &str = "COOP_THREADS_GUARD_PAGE";

/// Settings applied to every logical thread spawned from one kernel thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Usable stack size of each spawned thread, in bytes
    pub stack_size: usize,
    /// Reserve an inaccessible page below each stack
    pub guard_page: bool,
}

impl SchedulerConfig {
    pub const DEFAULT_STACK_SIZE: usize = 1 << 21;
    pub const MIN_STACK_SIZE: usize = 16 * 1024;
    pub const MAX_STACK_SIZE: usize = 1 << 30;

    pub const DEFAULT: Self = Self {
        stack_size: Self::DEFAULT_STACK_SIZE,
        guard_page: true,
    };

    pub const fn new() -> Self {
        Self::DEFAULT
    }

    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub const fn with_guard_page(mut self, guard_page: bool) -> Self {
        self.guard_page = guard_page;
        self
    }

    /// Check that the settings describe a stack we are willing to allocate.
    pub fn validate(&self) -> ThreadResult<()> {
        if self.stack_size < Self::MIN_STACK_SIZE {
            return Err(ThreadError::StackTooSmall {
                requested: self.stack_size,
                minimum: Self::MIN_STACK_SIZE,
            });
        }
        if self.stack_size > Self::MAX_STACK_SIZE {
            return Err(ThreadError::StackTooLarge {
                requested: self.stack_size,
                maximum: Self::MAX_STACK_SIZE,
            });
        }
        Ok(())
    }

    /// Build a configuration from the process environment, falling back to
    /// the defaults for unset variables.
    pub fn from_env() -> ThreadResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> ThreadResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::DEFAULT;

        if let Some(raw) = lookup(STACK_SIZE_ENV) {
            config.stack_size = parse_size(&raw).ok_or(ThreadError::InvalidEnvironment {
                variable: STACK_SIZE_ENV,
            })?;
        }

        if let Some(raw) = lookup(GUARD_PAGE_ENV) {
            config.guard_page = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ThreadError::InvalidEnvironment {
                        variable: GUARD_PAGE_ENV,
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn parse_size(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    let (digits, shift) = match raw.as_bytes().last()? {
        b'k' | b'K' => (&raw[..raw.len() - 1], 10),
        b'm' | b'M' => (&raw[..raw.len() - 1], 20),
        _ => (raw, 0),
    };
    let value: usize = digits.trim().parse().ok()?;
    value.checked_mul(1usize << shift)
}
