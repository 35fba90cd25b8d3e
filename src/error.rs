use thiserror::Error;

/// Recoverable errors surfaced by configuration and initialization.
///
/// Scheduling itself has no error channel: a yield that finds nothing to run
/// reports `false`, and broken scheduler invariants abort the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ThreadError {
    #[error("scheduler already initialized on this kernel thread")]
    AlreadyInitialized,
    #[error("scheduler not initialized on this kernel thread")]
    NotInitialized,
    #[error("stack size of {requested} bytes is below the minimum of {minimum} bytes")]
    StackTooSmall { requested: usize, minimum: usize },
    #[error("stack size of {requested} bytes exceeds the maximum of {maximum} bytes")]
    StackTooLarge { requested: usize, maximum: usize },
    #[error("environment variable {variable} has an invalid value")]
    InvalidEnvironment { variable: &'static str },
}

pub type ThreadResult<T> = Result<T, ThreadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ThreadError::AlreadyInitialized.to_string(),
            "scheduler already initialized on this kernel thread"
        );
        assert_eq!(
            ThreadError::StackTooSmall { requested: 1024, minimum: 16384 }.to_string(),
            "stack size of 1024 bytes is below the minimum of 16384 bytes"
        );
        assert_eq!(
            ThreadError::InvalidEnvironment { variable: "COOP_THREADS_STACK_SIZE" }.to_string(),
            "environment variable COOP_THREADS_STACK_SIZE has an invalid value"
        );
    }
}
