//! Scheduler configuration
//!
//! Follows the teacher's own `Config` + builder-method convention (see the
//! original `work_stealing::Config`) rather than reaching for an external
//! config crate: the option set here is small and entirely init-time.

use crate::scheduler::error::{SchedResult, SchedulerError};
use serde::{Deserialize, Serialize};

/// Default per-worker budget of concurrent outstanding steal requests.
pub const DEFAULT_MAX_STEAL: usize = 1;

/// Default window size for the adaptive steal-half/steal-one retune.
pub const DEFAULT_STEAL_ADAPTIVE_INTERVAL: u32 = 25;

/// Amount of work a victim surrenders by default, and whether that amount
/// is retuned at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StealStrategy {
    /// Victim always surrenders exactly one task.
    One,
    /// Victim always surrenders half of its deque.
    Half,
    /// Start at `Half`, retune towards `One` based on recent throughput
    /// (§4.8 of the scheduler spec).
    Adaptive,
}

impl Default for StealStrategy {
    fn default() -> Self {
        StealStrategy::One
    }
}

/// Init-time configuration for one partition's scheduler.
///
/// Mirrors the configuration table from the scheduler's external-interfaces
/// section: `MaxSteal`, `MaxStealAttempts`, `StealStrategy`,
/// `StealAdaptativeInterval`, `VictimCheck`, `StealLastVictim`,
/// `StealLastThief`, `DebugTD`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of workers in this partition.
    pub num_workers: usize,
    /// Max concurrent outstanding steal requests per worker (also the count
    /// of SPSC task inboxes each worker owns).
    pub max_steal: usize,
    /// Max forwards of a steal request before it returns to its origin.
    /// `None` means "derive from `num_workers - 1`" at `validate()` time.
    pub max_steal_attempts: Option<u32>,
    /// Default stealing amount / adaptive policy.
    pub steal_strategy: StealStrategy,
    /// Window size (in completed steals) for the adaptive retune.
    pub steal_adaptive_interval: u32,
    /// Enable the cache-line-padded per-worker "has tasks" atomic.
    pub victim_check: bool,
    /// Bias initial victim selection towards the worker that last donated
    /// tasks to us.
    pub steal_last_victim: bool,
    /// Bias initial victim selection towards the worker that last stole
    /// from us.
    pub steal_last_thief: bool,
    /// Emit termination-detection trace events.
    pub debug_td: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_steal: DEFAULT_MAX_STEAL,
            max_steal_attempts: None,
            steal_strategy: StealStrategy::default(),
            steal_adaptive_interval: DEFAULT_STEAL_ADAPTIVE_INTERVAL,
            victim_check: false,
            steal_last_victim: false,
            steal_last_thief: false,
            debug_td: false,
        }
    }
}

impl Config {
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n.max(1);
        self
    }

    pub fn max_steal(mut self, n: usize) -> Self {
        self.max_steal = n.max(1);
        self
    }

    pub fn max_steal_attempts(mut self, n: u32) -> Self {
        self.max_steal_attempts = Some(n);
        self
    }

    pub fn steal_strategy(mut self, strategy: StealStrategy) -> Self {
        self.steal_strategy = strategy;
        self
    }

    pub fn victim_check(mut self, enabled: bool) -> Self {
        self.victim_check = enabled;
        self
    }

    pub fn steal_last_victim(mut self, enabled: bool) -> Self {
        self.steal_last_victim = enabled;
        self
    }

    pub fn steal_last_thief(mut self, enabled: bool) -> Self {
        self.steal_last_thief = enabled;
        self
    }

    pub fn debug_td(mut self, enabled: bool) -> Self {
        self.debug_td = enabled;
        self
    }

    /// Resolve the effective `MaxStealAttempts`, defaulting to
    /// `num_workers - 1` as the scheduler spec requires.
    pub fn effective_max_steal_attempts(&self) -> u32 {
        self.max_steal_attempts
            .unwrap_or_else(|| (self.num_workers.saturating_sub(1)) as u32)
    }

    /// Read boolean debug/tuning knobs from `WORKSTEAL_*` environment
    /// variables, overriding whatever was set on `self`. Init-time only —
    /// never consulted again once a partition is running.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("WORKSTEAL_VICTIM_CHECK") {
            self.victim_check = parse_bool_env(&v, self.victim_check);
        }
        if let Ok(v) = std::env::var("WORKSTEAL_DEBUG_TD") {
            self.debug_td = parse_bool_env(&v, self.debug_td);
        }
        if let Ok(v) = std::env::var("WORKSTEAL_LAST_VICTIM") {
            self.steal_last_victim = parse_bool_env(&v, self.steal_last_victim);
        }
        if let Ok(v) = std::env::var("WORKSTEAL_LAST_THIEF") {
            self.steal_last_thief = parse_bool_env(&v, self.steal_last_thief);
        }
        self
    }

    /// Validate the configuration, returning a descriptive error instead of
    /// panicking deep inside partition setup.
    pub fn validate(&self) -> SchedResult<()> {
        if self.num_workers == 0 {
            return Err(SchedulerError::EmptyPartition);
        }
        if self.max_steal == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_steal must be >= 1".into(),
            ));
        }
        let max_attempts = self.effective_max_steal_attempts();
        if self.num_workers > 1 && max_attempts == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_steal_attempts must be >= 1 when num_workers > 1".into(),
            ));
        }
        if self.steal_adaptive_interval == 0 {
            return Err(SchedulerError::InvalidConfig(
                "steal_adaptive_interval must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_bool_env(value: &str, fallback: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => fallback,
    }
}
