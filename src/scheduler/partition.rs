//! Partition assembly (§6 "Channel sizing on init", §3 `Partition`).
//!
//! A `Partition` owns the shared tables (request inboxes, task inboxes,
//! victim flags, the `tasking_done` flag) and builds one `WorkerContext` per
//! worker. It does not spawn threads itself — `runtime::Scheduler` does that
//! — so that tests can drive a partition's workers from a single thread too.

use crate::scheduler::adaptive::AdaptiveController;
use crate::scheduler::channel::{bounded_channel, unbounded_channel, ChanTx};
use crate::scheduler::config::{Config, StealStrategy};
use crate::scheduler::error::SchedResult;
use crate::scheduler::task::BoxedTask;
use crate::scheduler::victim::new_victim_flags;
use crate::scheduler::worker::{SharedTables, WorkerContext};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Local deque capacity, per worker. Generous relative to `max_steal` since
/// it bounds `spawn_local`, not the steal protocol.
const DEQUE_LOCAL_CAPACITY: usize = 4096;

/// A fully wired, not-yet-running set of worker contexts for one partition.
pub struct Partition {
    pub num_workers: usize,
    pub num_workers_rt: usize,
    pub workers: Vec<WorkerContext>,
    /// Sending half of worker 0's injection inbox, cloneable so callers on
    /// any thread can hand it fresh work before/while the partition runs.
    pub injector: ChanTx<BoxedTask>,
    pub tasking_done: Arc<AtomicBool>,
}

impl Partition {
    /// Build a partition from `config`, validating it first.
    pub fn new(config: &Config) -> SchedResult<Partition> {
        config.validate()?;

        let num_workers = config.num_workers;
        let max_steal = config.max_steal;
        let max_steal_attempts = config.effective_max_steal_attempts();

        let request_capacity = max_steal * num_workers;
        let mut request_txs = Vec::with_capacity(num_workers);
        let mut request_rxs = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            // Root fields a request from every worker at every depth of
            // lifeline escalation, so it gets double the headroom (§6).
            let cap = if id == 0 { request_capacity * 2 } else { request_capacity };
            let (tx, rx) = bounded_channel(cap);
            request_txs.push(tx);
            request_rxs.push(rx);
        }

        let mut task_inbox_txs = Vec::with_capacity(num_workers);
        let mut task_inbox_rxs = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let mut txs = Vec::with_capacity(max_steal);
            let mut rxs = Vec::with_capacity(max_steal);
            for _ in 0..max_steal {
                let (tx, rx) = bounded_channel(1);
                txs.push(tx);
                rxs.push(rx);
            }
            task_inbox_txs.push(txs);
            task_inbox_rxs.push(rxs);
        }

        let tasking_done = Arc::new(AtomicBool::new(false));
        let victim_flags = Arc::new(new_victim_flags(num_workers));

        let shared = Arc::new(SharedTables {
            request_txs,
            task_inbox_txs,
            victim_flags,
            tasking_done: Arc::clone(&tasking_done),
        });

        let (injector_tx, injector_rx) = unbounded_channel::<BoxedTask>();
        let initial_stealhalf = matches!(config.steal_strategy, StealStrategy::Half | StealStrategy::Adaptive);
        let adaptive = AdaptiveController::new(
            matches!(config.steal_strategy, StealStrategy::Adaptive),
            config.steal_adaptive_interval,
        );

        let mut workers = Vec::with_capacity(num_workers);
        let mut task_inbox_rxs = task_inbox_rxs.into_iter();
        let mut request_rxs = request_rxs.into_iter();
        let mut injector_rx = Some(injector_rx);
        for id in 0..num_workers {
            let request_rx = request_rxs.next().expect("one request_rx per worker");
            let inbox_rxs = task_inbox_rxs.next().expect("one inbox set per worker");
            let inject_rx = if id == 0 { injector_rx.take() } else { None };
            workers.push(WorkerContext::new(
                id,
                id, // pID == ID within a single-partition runtime.
                0,
                num_workers,
                max_steal,
                max_steal_attempts,
                DEQUE_LOCAL_CAPACITY,
                request_rx,
                inbox_rxs,
                inject_rx,
                Arc::clone(&shared),
                adaptive,
                initial_stealhalf,
                config.victim_check,
                config.steal_last_victim,
                config.steal_last_thief,
            ));
        }

        Ok(Partition {
            num_workers,
            num_workers_rt: num_workers,
            workers,
            injector: injector_tx,
            tasking_done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_worker_context_per_worker() {
        let cfg = Config::default().num_workers(4).max_steal(2);
        let partition = Partition::new(&cfg).unwrap();
        assert_eq!(partition.workers.len(), 4);
        for (id, w) in partition.workers.iter().enumerate() {
            assert_eq!(w.id, id);
            assert_eq!(w.channel_stack.capacity(), 2);
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = Config::default().num_workers(0);
        assert!(Partition::new(&cfg).is_err());
    }

    #[test]
    fn only_worker_zero_has_an_injector_inbox() {
        let cfg = Config::default().num_workers(3);
        let partition = Partition::new(&cfg).unwrap();
        assert!(partition.workers[0].inject_rx.is_some());
        assert!(partition.workers[1].inject_rx.is_none());
        assert!(partition.workers[2].inject_rx.is_none());
    }
}
