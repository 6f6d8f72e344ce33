//! Victim selection (§4.2): `next_victim`, `random_victim`, `steal_from`,
//! `likely_has_tasks`, `mark_as_idle`.

use crate::scheduler::bitfield::Bitfield32;
use crate::scheduler::request::StealRequest;
use crate::scheduler::tree::WorkerTree;
use crossbeam_utils::CachePadded;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-worker "has tasks" flags for the `VictimCheck` optimization, one per
/// worker in the partition. Cache-line padded per §9 to avoid false sharing;
/// read/written with relaxed ordering since false positives are tolerated.
pub type VictimFlags = Vec<CachePadded<AtomicBool>>;

pub fn new_victim_flags(num_workers_rt: usize) -> VictimFlags {
    (0..num_workers_rt)
        .map(|_| CachePadded::new(AtomicBool::new(false)))
        .collect()
}

/// Recursively clear `n` and all of its descendants in `victims`. No-op for
/// `n == None` (the spec's `n == -1`).
pub fn mark_as_idle(victims: &mut Bitfield32, n: Option<usize>, num_workers_rt: usize) {
    let Some(n) = n else { return };
    victims.clear(n);
    let left = 2 * n + 1;
    let right = 2 * n + 2;
    if left < num_workers_rt {
        mark_as_idle(victims, Some(left), num_workers_rt);
    }
    if right < num_workers_rt {
        mark_as_idle(victims, Some(right), num_workers_rt);
    }
}

/// Fast-path/slow-path uniform random selection among set bits, excluding
/// `my_id`. Returns `None` only when `victims` is empty.
pub fn random_victim(
    victims: Bitfield32,
    my_id: usize,
    num_workers_rt: usize,
    rng: &mut impl Rng,
) -> Option<usize> {
    if victims.is_empty() || num_workers_rt == 0 {
        return None;
    }
    for _ in 0..3 {
        let candidate = rng.gen_range(0..num_workers_rt);
        if candidate != my_id && victims.is_set(candidate) {
            return Some(candidate);
        }
    }
    let (scratch, n) = victims.collect();
    if n == 0 {
        return None;
    }
    let idx = rng.gen_range(0..n);
    Some(scratch[idx])
}

/// Reads the `VictimCheck` atomic for `id`, or unconditionally `true` when
/// the optimization is disabled.
pub fn likely_has_tasks(id: usize, victim_check_enabled: bool, flags: &VictimFlags) -> bool {
    if !victim_check_enabled {
        return true;
    }
    flags[id].load(Ordering::Relaxed)
}

/// Choose where to forward `req` next, or return `req.id` to bounce it home.
/// Mutates `req`'s `victims` bitfield in place (clearing `my_id`, and masking
/// out idle subtrees on the forwarding path).
pub fn next_victim(
    req: &mut StealRequest,
    my_id: usize,
    tree: &WorkerTree,
    num_workers_rt: usize,
    max_steal_attempts: u32,
    rng: &mut impl Rng,
) -> usize {
    let mut victims = req.victims();
    victims.clear(my_id);
    req.set_victims(victims);

    if req.id as usize == my_id {
        if num_workers_rt <= 1 {
            return req.id as usize;
        }
        loop {
            let candidate = rng.gen_range(0..num_workers_rt);
            if candidate != my_id {
                return candidate;
            }
        }
    }

    if req.retry == max_steal_attempts {
        return req.id as usize;
    }

    if tree.both_subtrees_idle() {
        mark_as_idle(&mut victims, Some(my_id), num_workers_rt);
    } else {
        if tree.left_subtree_is_idle {
            mark_as_idle(&mut victims, tree.left_child, num_workers_rt);
        }
        if tree.right_subtree_is_idle {
            mark_as_idle(&mut victims, tree.right_child, num_workers_rt);
        }
    }
    req.set_victims(victims);

    match random_victim(victims, my_id, num_workers_rt, rng) {
        Some(v) => v,
        None => req.id as usize,
    }
}

/// Biased victim selection: reuse `hint` (last victim or last thief) when it
/// is still plausible, else fall back to `next_victim`.
pub fn steal_from(
    req: &mut StealRequest,
    hint: Option<usize>,
    my_id: usize,
    tree: &WorkerTree,
    num_workers_rt: usize,
    max_steal_attempts: u32,
    rng: &mut impl Rng,
    victim_check_enabled: bool,
    flags: &VictimFlags,
) -> usize {
    if let Some(h) = hint {
        if h != my_id && h != req.id as usize && likely_has_tasks(h, victim_check_enabled, flags) {
            let mut victims = req.victims();
            victims.clear(my_id);
            req.set_victims(victims);
            return h;
        }
    }
    next_victim(req, my_id, tree, num_workers_rt, max_steal_attempts, rng)
}
