//! worksteal - a distributed work-stealing / work-sharing scheduler core
//! for partitioned, multithreaded task runtimes.
//!
//! Build a [`scheduler::Config`], hand it to [`scheduler::Scheduler::start`],
//! and `spawn` closures onto it. Idle workers steal from each other through
//! a bounded, retry-based request/reply protocol instead of blocking; see
//! the [`scheduler`] module for the full design.

pub mod scheduler;

pub use scheduler::{boxed, BoxedTask, Config, SchedResult, Scheduler, SchedulerError, StealStrategy, TaskId};
