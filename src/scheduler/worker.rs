//! Per-worker context and hot loop (§2, §5, §9 "init/teardown").
//!
//! Everything here is owned exclusively by the OS thread running this
//! worker; the only things that cross a thread boundary are channel
//! payloads, the shared `request_txs`/`task_inbox_txs` tables, the
//! `VictimFlags`, and the `tasking_done` flag.

use crate::scheduler::adaptive::AdaptiveController;
use crate::scheduler::channel::{ChanRx, ChanTx};
use crate::scheduler::channel_stack::ChannelStack;
use crate::scheduler::deque;
use crate::scheduler::lifeline::LifelineQueue;
use crate::scheduler::request::StealRequest;
use crate::scheduler::stats::WorkerStats;
use crate::scheduler::task::BoxedTask;
use crate::scheduler::task_transport;
use crate::scheduler::tree::WorkerTree;
use crate::scheduler::victim::VictimFlags;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug_span, error};

/// A reply to a steal request: the victim's donated tasks. Always a batch
/// (size 1 under `StealStrategy::One`) so a capacity-1 SPSC channel carries
/// either policy uniformly.
pub type TaskBatch = Vec<BoxedTask>;

/// Resources shared read-only (or through interior atomics) across every
/// worker in a partition. Built once by `Partition::new` and handed to each
/// worker thread.
pub struct SharedTables {
    pub request_txs: Vec<ChanTx<StealRequest>>,
    pub task_inbox_txs: Vec<Vec<ChanTx<TaskBatch>>>,
    pub victim_flags: Arc<VictimFlags>,
    pub tasking_done: Arc<AtomicBool>,
}

pub struct WorkerContext {
    pub id: usize,
    pub p_id: usize,
    pub partition: u32,
    pub num_workers_rt: usize,
    pub max_steal: usize,
    pub max_steal_attempts: u32,

    pub tree: WorkerTree,
    pub deque: deque::Worker<BoxedTask>,
    pub self_stealer: deque::Stealer<BoxedTask>,
    pub channel_stack: ChannelStack,
    pub lifeline: LifelineQueue,

    pub request_rx: ChanRx<StealRequest>,
    pub task_inbox_rxs: Vec<ChanRx<TaskBatch>>,
    /// External task injection inbox; only `Some` for the worker(s) callers
    /// are allowed to submit fresh work to (root, in the demo/runtime).
    pub inject_rx: Option<ChanRx<BoxedTask>>,

    pub shared: Arc<SharedTables>,

    pub rng: SmallRng,
    pub requested: usize,
    pub dropped_steal_requests: usize,
    pub pending_dropped_handles: Vec<u32>,
    pub stats: WorkerStats,
    pub adaptive: AdaptiveController,
    pub stealhalf: bool,

    pub victim_check: bool,
    pub steal_last_victim: bool,
    pub steal_last_thief: bool,
    pub last_victim: Option<usize>,
    pub last_thief: Option<usize>,
}

impl WorkerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        p_id: usize,
        partition: u32,
        num_workers_rt: usize,
        max_steal: usize,
        max_steal_attempts: u32,
        deque_local_capacity: usize,
        request_rx: ChanRx<StealRequest>,
        task_inbox_rxs: Vec<ChanRx<TaskBatch>>,
        inject_rx: Option<ChanRx<BoxedTask>>,
        shared: Arc<SharedTables>,
        adaptive: AdaptiveController,
        initial_stealhalf: bool,
        victim_check: bool,
        steal_last_victim: bool,
        steal_last_thief: bool,
    ) -> WorkerContext {
        let (deque, self_stealer) = deque::Worker::new(deque_local_capacity);
        WorkerContext {
            id,
            p_id,
            partition,
            num_workers_rt,
            max_steal,
            max_steal_attempts,
            tree: WorkerTree::init(p_id, num_workers_rt),
            deque,
            self_stealer,
            channel_stack: ChannelStack::full(max_steal),
            lifeline: LifelineQueue::new(),
            request_rx,
            task_inbox_rxs,
            inject_rx,
            shared,
            rng: SmallRng::seed_from_u64(id as u64 + 1000),
            requested: 0,
            dropped_steal_requests: 0,
            pending_dropped_handles: Vec::with_capacity(max_steal),
            stats: WorkerStats::new(),
            adaptive,
            stealhalf: initial_stealhalf,
            victim_check,
            steal_last_victim,
            steal_last_thief,
            last_victim: None,
            last_thief: None,
        }
    }

    #[inline]
    pub fn tasking_done(&self) -> bool {
        self.shared.tasking_done.load(Ordering::Relaxed)
    }

    /// Push a freshly spawned task onto the local deque, then drain the
    /// lifeline queue if anyone is waiting on it (§4.6: newly-acquired work
    /// is shared downward before new steals are issued). The push must
    /// happen first — draining hands out tasks by stealing from this same
    /// deque.
    pub fn spawn_local(&mut self, task: BoxedTask) {
        if self.deque.push(task).is_err() {
            error!(worker = self.id, "local deque full, task dropped");
            return;
        }
        task_transport::drain_lifeline(self);
    }

    fn run_task(&mut self, task: BoxedTask) {
        task();
        self.stats.record_task_executed();
    }

    /// One iteration of the hot loop (§5): execute a local task, poll the
    /// request inbox, poll task inboxes (which triggers a new steal
    /// attempt on miss). Returns `true` if any work happened this tick.
    pub fn tick(&mut self) -> bool {
        let mut did_work = false;

        if let Some(task) = self.inject_rx.as_ref().and_then(|rx| rx.try_recv()) {
            self.spawn_local(task);
            did_work = true;
        }

        if let deque::StealResult::Success(task) = self.deque.pop() {
            self.run_task(task);
            did_work = true;
        }

        if let Some(req) = crate::scheduler::transport::recv_req(&self.request_rx, &mut self.tree, &mut self.lifeline) {
            task_transport::handle_incoming_request(self, req);
            did_work = true;
        }

        if task_transport::recv_task(self) {
            did_work = true;
        }

        did_work
    }

    /// Run until global termination is observed. Intended to be the body of
    /// the worker's OS thread.
    pub fn run(&mut self) {
        let span = debug_span!("worker", id = self.id);
        let _guard = span.enter();
        loop {
            let did_work = self.tick();
            if self.tasking_done() {
                return;
            }
            let injector_drained = self.inject_rx.as_ref().map(|rx| rx.is_empty()).unwrap_or(true);
            if !did_work && self.id == 0 && injector_drained && self.tree.is_locally_quiescent(self.deque.is_empty()) {
                self.shared.tasking_done.store(true, Ordering::Relaxed);
                return;
            }
        }
    }

    pub fn drop_request(&mut self, handle: u32) {
        self.requested -= 1;
        self.dropped_steal_requests += 1;
        self.pending_dropped_handles.push(handle);
    }

    pub fn reconcile_drops(&mut self) {
        for h in self.pending_dropped_handles.drain(..) {
            self.channel_stack.push(h);
        }
        self.dropped_steal_requests = 0;
    }

    /// The worker has exhausted its last outstanding steal request and must
    /// enter work-sharing quiescence: flush any still-pending drops, free
    /// this request's handle too (safe: no new steal is issued while
    /// `waiting_for_tasks`), and mark itself waiting.
    pub fn finalize_quiescence(&mut self, handle: u32) {
        self.requested -= 1;
        self.reconcile_drops();
        self.channel_stack.push(handle);
        self.tree.waiting_for_tasks = true;
    }
}

#[cfg(test)]
mod tests {
    use crate::scheduler::config::Config;
    use crate::scheduler::partition::Partition;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn spawn_local_then_tick_runs_the_task() {
        let config = Config::default().num_workers(1);
        let mut partition = Partition::new(&config).unwrap();
        let ctx = &mut partition.workers[0];
        let ran = Arc::new(AtomicU64::new(0));
        let r = Arc::clone(&ran);
        ctx.spawn_local(Box::new(move || {
            r.fetch_add(1, Ordering::Relaxed);
        }));
        assert!(!ctx.deque.is_empty());
        ctx.tick();
        assert_eq!(ran.load(Ordering::Relaxed), 1);
        assert!(ctx.deque.is_empty());
    }

    #[test]
    fn tick_on_a_fully_idle_single_worker_is_harmless() {
        let config = Config::default().num_workers(1);
        let mut partition = Partition::new(&config).unwrap();
        let ctx = &mut partition.workers[0];
        for _ in 0..8 {
            ctx.tick();
        }
        assert!(ctx.tree.waiting_for_tasks);
    }
}
