//! Per-worker profiling counters (§2 "scalar counters", §4.8 adaptive
//! tallies). Plain fields, not atomics: single-writer by construction, owned
//! exclusively by the thread running that worker.

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStats {
    pub requests_sent: u64,
    pub requests_steal_half: u64,
    pub requests_steal_one: u64,
    pub tasks_executed: u64,
    pub steals_satisfied: u64,
    /// Tasks executed within the current adaptive window.
    pub num_tasks_exec_recently: u32,
    /// Steals this worker completed as thief within the current adaptive
    /// window (consulted by `AdaptiveController::maybe_retune`, §4.8).
    pub num_steals_exec_recently: u32,
}

impl WorkerStats {
    pub fn new() -> WorkerStats {
        WorkerStats::default()
    }

    pub fn record_request_sent(&mut self, stealhalf: Option<bool>) {
        self.requests_sent += 1;
        match stealhalf {
            Some(true) => self.requests_steal_half += 1,
            Some(false) => self.requests_steal_one += 1,
            None => {}
        }
    }

    pub fn record_task_executed(&mut self) {
        self.tasks_executed += 1;
        self.num_tasks_exec_recently += 1;
    }

    /// Victim side: this worker donated tasks to a thief. Lifetime counter
    /// only — the adaptive window tracks steals completed as thief, not
    /// donations made as victim.
    pub fn record_steal_satisfied(&mut self) {
        self.steals_satisfied += 1;
    }

    /// Thief side: a steal this worker issued was just satisfied by an
    /// inbox hit. Drives the adaptive window (§4.5/§4.8).
    pub fn record_steal_completed(&mut self) {
        self.num_steals_exec_recently += 1;
    }

    pub fn reset_adaptive_window(&mut self) {
        self.num_tasks_exec_recently = 0;
        self.num_steals_exec_recently = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_request_sent_tallies_by_policy() {
        let mut s = WorkerStats::new();
        s.record_request_sent(Some(true));
        s.record_request_sent(Some(false));
        s.record_request_sent(None);
        assert_eq!(s.requests_sent, 3);
        assert_eq!(s.requests_steal_half, 1);
        assert_eq!(s.requests_steal_one, 1);
    }

    #[test]
    fn reset_adaptive_window_clears_only_window_counters() {
        let mut s = WorkerStats::new();
        s.record_task_executed();
        s.record_steal_completed();
        s.reset_adaptive_window();
        assert_eq!(s.num_tasks_exec_recently, 0);
        assert_eq!(s.num_steals_exec_recently, 0);
        assert_eq!(s.tasks_executed, 1);
    }

    #[test]
    fn record_steal_satisfied_does_not_touch_the_adaptive_window() {
        let mut s = WorkerStats::new();
        s.record_steal_satisfied();
        assert_eq!(s.steals_satisfied, 1);
        assert_eq!(s.num_steals_exec_recently, 0);
    }

    #[test]
    fn record_steal_completed_does_not_touch_the_lifetime_counter() {
        let mut s = WorkerStats::new();
        s.record_steal_completed();
        assert_eq!(s.num_steals_exec_recently, 1);
        assert_eq!(s.steals_satisfied, 0);
    }
}
