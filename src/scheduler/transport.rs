//! Request transport (§4.3): `send_req` / `recv_req`.

use crate::scheduler::channel::{ChanRx, ChanTx};
use crate::scheduler::error::{SchedResult, SchedulerError};
use crate::scheduler::lifeline::LifelineQueue;
use crate::scheduler::request::{RequestState, StealRequest};
use crate::scheduler::tree::WorkerTree;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Retry a non-blocking send until it succeeds, `tasking_done` flips true,
/// or the worker gives up. Every third consecutive failure logs a warning;
/// exhausting `max_attempts` is fatal (§7: indicates under-sized channel
/// capacity, a configuration bug, not a runtime condition).
pub fn send_req(
    tx: &ChanTx<StealRequest>,
    mut req: StealRequest,
    tasking_done: &AtomicBool,
    worker: usize,
    target: usize,
    max_attempts: u32,
) -> SchedResult<()> {
    let mut attempts: u32 = 0;
    loop {
        match tx.try_send(req) {
            Ok(()) => return Ok(()),
            Err(returned) => {
                req = returned;
                attempts += 1;
                if tasking_done.load(Ordering::Relaxed) {
                    return Ok(());
                }
                if attempts % 3 == 0 {
                    warn!(worker, target, attempts, "steal request send still failing");
                }
                if attempts >= max_attempts {
                    return Err(SchedulerError::WorkerBlocked {
                        worker,
                        target,
                        attempts,
                    });
                }
            }
        }
    }
}

/// Attempt one non-blocking receive on the worker's request inbox.
///
/// `Failed` messages are intercepted transparently: the sender must be this
/// worker's left or right child (asserted), the corresponding subtree-idle
/// flag is set, the request is retained on the lifeline queue, and the loop
/// continues. Returns the first non-`Failed` message, or `None` once the
/// inbox is drained.
pub fn recv_req(
    rx: &ChanRx<StealRequest>,
    tree: &mut WorkerTree,
    lifeline: &mut LifelineQueue,
) -> Option<StealRequest> {
    loop {
        let req = rx.try_recv()?;
        if req.state() == RequestState::Failed {
            tree.mark_child_idle(req.id as usize);
            lifeline.enqueue(req);
            continue;
        }
        return Some(req);
    }
}
