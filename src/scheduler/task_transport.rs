//! Task transport (§4.4) and the steal-attempt pump (§4.5): `recv_task`,
//! `try_send_steal_request`, plus the victim-side request handling that
//! ties the two together (§4.6's lifeline draining and §4.7's termination
//! bookkeeping).

use crate::scheduler::bitfield::Bitfield32;
use crate::scheduler::deque::StealResult;
use crate::scheduler::request::{RequestState, StealRequest};
use crate::scheduler::transport;
use crate::scheduler::victim;
use crate::scheduler::worker::{TaskBatch, WorkerContext};
use std::sync::atomic::Ordering;
use tracing::{trace, warn};

/// Retry a task-batch reply a bounded number of times; if the target's
/// inbox never drains (it should, since each handle is exclusively owned by
/// one outstanding request), give up and push the batch back onto our own
/// deque rather than lose the tasks.
fn send_task_batch(ctx: &mut WorkerContext, target: usize, chan: u32, mut batch: TaskBatch) {
    let tx = ctx.shared.task_inbox_txs[target][chan as usize].clone();
    for attempt in 0..64u32 {
        match tx.try_send(batch) {
            Ok(()) => return,
            Err(returned) => {
                batch = returned;
                if ctx.tasking_done() {
                    return;
                }
                if attempt % 3 == 2 {
                    warn!(worker = ctx.id, target, attempt, "task reply still failing to send");
                }
            }
        }
    }
    warn!(worker = ctx.id, target, "giving up on task reply, reclaiming tasks locally");
    for task in batch {
        let _ = ctx.deque.push(task);
    }
}

/// Drain the lifeline queue by handing each retained `Failed` request a
/// task from our own deque, before issuing any new steal request of our
/// own (§4.6).
pub fn drain_lifeline(ctx: &mut WorkerContext) {
    loop {
        let Some(req) = ctx.lifeline.head().copied() else {
            break;
        };
        match ctx.self_stealer.steal() {
            StealResult::Success(task) => {
                ctx.lifeline.dequeue();
                let child = req.id as usize;
                if Some(child) == ctx.tree.left_child {
                    ctx.tree.left_subtree_is_idle = false;
                } else if Some(child) == ctx.tree.right_child {
                    ctx.tree.right_subtree_is_idle = false;
                }
                trace!(worker = ctx.id, child, "draining lifeline");
                send_task_batch(ctx, child, req.chan, vec![task]);
            }
            StealResult::Empty => break,
            StealResult::Retry => continue,
        }
    }
}

/// Poll each of the worker's `MaxSteal` task inboxes in order. On a hit,
/// reconcile outstanding-request bookkeeping and run the task (after
/// draining the lifeline, since this is newly-acquired work). On a miss
/// across all inboxes, trigger a new steal attempt.
pub fn recv_task(ctx: &mut WorkerContext) -> bool {
    for i in 0..ctx.task_inbox_rxs.len() {
        if let Some(mut batch) = ctx.task_inbox_rxs[i].try_recv() {
            let Some(task) = batch.pop() else {
                continue;
            };

            if ctx.tree.waiting_for_tasks {
                // `finalize_quiescence` already pushed every handle back onto
                // the stack, so the stack stays untouched here — the
                // unconditional decrement below is what brings `requested`
                // back down to its true idle baseline of 0.
                debug_assert_eq!(
                    ctx.channel_stack.top(),
                    ctx.max_steal,
                    "channel stack must be fully restored while waiting_for_tasks"
                );
                ctx.requested = 1;
                ctx.tree.waiting_for_tasks = false;
                ctx.dropped_steal_requests = 0;
                ctx.pending_dropped_handles.clear();
            } else {
                ctx.channel_stack.push(i as u32);
                if ctx.dropped_steal_requests > 0 {
                    ctx.reconcile_drops();
                }
            }
            ctx.requested = ctx.requested.saturating_sub(1);

            drain_lifeline(ctx);
            for extra in batch {
                let _ = ctx.deque.push(extra);
            }
            task();
            ctx.stats.record_task_executed();
            ctx.stats.record_steal_completed();
            return true;
        }
    }

    try_send_steal_request(ctx, ctx.deque.is_empty());
    false
}

/// `try_send_steal_request` (§4.5): build and dispatch a new steal request
/// if the worker has budget, isn't already fully quiescent, and (in
/// adaptive mode) after retuning the steal-half/steal-one policy.
pub fn try_send_steal_request(ctx: &mut WorkerContext, idle: bool) {
    if ctx.requested == ctx.max_steal {
        return;
    }
    if ctx.tree.waiting_for_tasks {
        // Silent until the parent feeds us (§4.6): no new steal traffic.
        return;
    }

    ctx.stealhalf = ctx.adaptive.maybe_retune(&mut ctx.stats, ctx.stealhalf);

    let Some(chan) = ctx.channel_stack.pop() else {
        return;
    };

    let state = if idle { RequestState::Idle } else { RequestState::Working };
    let mut req = StealRequest::new(
        chan,
        ctx.id as u32,
        ctx.partition,
        ctx.p_id as u32,
        Bitfield32::set_up_to(ctx.num_workers_rt),
        state,
        ctx.stealhalf,
    );

    let hint = if ctx.steal_last_victim {
        ctx.last_victim
    } else if ctx.steal_last_thief {
        ctx.last_thief
    } else {
        None
    };

    let target = if hint.is_some() {
        victim::steal_from(
            &mut req,
            hint,
            ctx.id,
            &ctx.tree,
            ctx.num_workers_rt,
            ctx.max_steal_attempts,
            &mut ctx.rng,
            ctx.victim_check,
            &ctx.shared.victim_flags,
        )
    } else {
        victim::next_victim(
            &mut req,
            ctx.id,
            &ctx.tree,
            ctx.num_workers_rt,
            ctx.max_steal_attempts,
            &mut ctx.rng,
        )
    };

    if target == ctx.id {
        // Only reachable for a single-worker partition (§9.6 Open Question
        // 3): nobody to steal from, so go straight to quiescence.
        if ctx.num_workers_rt > 1 {
            debug_assert!(false, "next_victim bounced home with other workers present");
        }
        // `finalize_quiescence` decrements `requested`, mirroring the normal
        // dispatch-then-eventually-return flow, so bump it first even though
        // this request was never actually handed to a transport channel.
        ctx.requested += 1;
        ctx.finalize_quiescence(chan);
        return;
    }

    let max_attempts = ctx.max_steal_attempts.max(1) * 3;
    match transport::send_req(
        &ctx.shared.request_txs[target],
        req,
        &ctx.shared.tasking_done,
        ctx.id,
        target,
        max_attempts,
    ) {
        Ok(()) => {
            ctx.requested += 1;
            let half = if ctx.adaptive.enabled { Some(ctx.stealhalf) } else { None };
            ctx.stats.record_request_sent(half);
        }
        Err(err) => {
            ctx.channel_stack.push(chan);
            tracing::error!(worker = ctx.id, target, ?err, "worker permanently blocked sending steal request");
        }
    }
}

/// Handle a request message that has come back around to its own
/// originator: either drop it (more outstanding requests remain) or
/// escalate to `Failed` and forward it to the parent / declare quiescence
/// at the root (§4.6, §4.7).
fn handle_own_request_returned(ctx: &mut WorkerContext, req: StealRequest) {
    if ctx.requested > 1 {
        ctx.drop_request(req.chan);
        return;
    }

    ctx.finalize_quiescence(req.chan);

    if let Some(parent) = ctx.tree.parent {
        let mut failed = req;
        failed.set_state(RequestState::Failed);
        let max_attempts = ctx.max_steal_attempts.max(1) * 3;
        if transport::send_req(
            &ctx.shared.request_txs[parent],
            failed,
            &ctx.shared.tasking_done,
            ctx.id,
            parent,
            max_attempts,
        )
        .is_err()
        {
            tracing::error!(worker = ctx.id, parent, "failed to lifeline request to parent");
        }
    }
    // Root: no parent to escalate to. `tree.waiting_for_tasks` now being
    // true, combined with both subtrees idle and an empty deque, is what
    // the root's own run loop checks for global quiescence.
}

/// Handle one incoming steal request (§4.2-§4.3, victim side): satisfy it
/// from our own deque if possible, otherwise forward it onward; if it is
/// our own request bouncing home, route to the origin-side handling.
pub fn handle_incoming_request(ctx: &mut WorkerContext, mut req: StealRequest) {
    if req.id as usize == ctx.id {
        handle_own_request_returned(ctx, req);
        return;
    }

    let reply = if req.stealhalf() {
        let batch = ctx.self_stealer.steal_half();
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    } else {
        match ctx.self_stealer.steal() {
            StealResult::Success(t) => Some(vec![t]),
            StealResult::Empty | StealResult::Retry => None,
        }
    };

    if let Some(tasks) = reply {
        ctx.last_thief = Some(req.id as usize);
        ctx.stats.record_steal_satisfied();
        if ctx.victim_check {
            ctx.shared.victim_flags[ctx.id].store(!ctx.deque.is_empty(), Ordering::Relaxed);
        }
        let target = req.id as usize;
        let chan = req.chan;
        send_task_batch(ctx, target, chan, tasks);
        return;
    }

    req.retry += 1;
    let target = victim::next_victim(
        &mut req,
        ctx.id,
        &ctx.tree,
        ctx.num_workers_rt,
        ctx.max_steal_attempts,
        &mut ctx.rng,
    );
    let max_attempts = ctx.max_steal_attempts.max(1) * 3;
    if transport::send_req(&ctx.shared.request_txs[target], req, &ctx.shared.tasking_done, ctx.id, target, max_attempts).is_err() {
        tracing::error!(worker = ctx.id, target, "failed to forward steal request");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::config::Config;
    use crate::scheduler::partition::Partition;

    #[test]
    fn drain_lifeline_on_an_empty_queue_is_a_no_op() {
        let config = Config::default().num_workers(4);
        let mut partition = Partition::new(&config).unwrap();
        let ctx = &mut partition.workers[0];
        assert!(ctx.lifeline.is_empty());
        drain_lifeline(ctx);
        assert!(ctx.lifeline.is_empty());
    }

    #[test]
    fn try_send_steal_request_respects_the_max_steal_budget() {
        let config = Config::default().num_workers(4).max_steal(2);
        let mut partition = Partition::new(&config).unwrap();
        let ctx = &mut partition.workers[1];
        try_send_steal_request(ctx, true);
        try_send_steal_request(ctx, true);
        assert_eq!(ctx.requested, 2);
        let top_before = ctx.channel_stack.top();
        try_send_steal_request(ctx, true);
        assert_eq!(ctx.requested, 2, "a third attempt must be refused once MaxSteal is reached");
        assert_eq!(ctx.channel_stack.top(), top_before);
    }

    #[test]
    fn try_send_steal_request_is_silent_while_waiting_for_tasks() {
        let config = Config::default().num_workers(4).max_steal(1);
        let mut partition = Partition::new(&config).unwrap();
        let ctx = &mut partition.workers[1];
        ctx.tree.waiting_for_tasks = true;
        let top_before = ctx.channel_stack.top();
        try_send_steal_request(ctx, true);
        assert_eq!(ctx.channel_stack.top(), top_before, "must not dispatch while waiting_for_tasks");
        assert_eq!(ctx.requested, 0);
    }
}
