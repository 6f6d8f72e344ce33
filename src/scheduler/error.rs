//! Scheduler error types
//!
//! Mirrors the teacher's own `PkgError`/`MountError` style: a plain enum with
//! a hand-written `Display` and `std::error::Error` impl, no macro crate.

use std::fmt;

/// Scheduler result type
pub type SchedResult<T> = Result<T, SchedulerError>;

/// Errors the scheduler core can report.
///
/// Transient channel contention is retried internally and only surfaces here
/// once it becomes permanent (a configuration bug, not a runtime condition
/// to recover from). Protocol invariant violations are not represented here
/// at all — they are `assert!`/`debug_assert!` failures, because there is
/// nothing a caller could do to recover from a corrupted scheduler
/// invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A worker could not deliver a steal request after exhausting its
    /// retry budget. Indicates an under-sized channel capacity.
    WorkerBlocked {
        worker: usize,
        target: usize,
        attempts: u32,
    },
    /// `Config::validate` rejected the configuration before a partition
    /// could be built.
    InvalidConfig(String),
    /// A partition was asked to run with a worker count of zero.
    EmptyPartition,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::WorkerBlocked {
                worker,
                target,
                attempts,
            } => write!(
                f,
                "worker {worker} blocked sending to worker {target} after {attempts} attempts \
                 (request channel capacity is too small for this configuration)"
            ),
            SchedulerError::InvalidConfig(msg) => write!(f, "invalid scheduler config: {msg}"),
            SchedulerError::EmptyPartition => write!(f, "partition has zero workers"),
        }
    }
}

impl std::error::Error for SchedulerError {}
