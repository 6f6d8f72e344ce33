//! End-to-end scenarios for the work-stealing scheduler core.
//!
//! Each test corresponds to one of the scheduler's seeded end-to-end
//! scenarios: two workers with one producer, immediate quiescence, lifeline
//! reactivation, adaptive downshift/upshift, and last-victim bias.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use worksteal::scheduler::bitfield::Bitfield32;
use worksteal::scheduler::config::StealStrategy;
use worksteal::scheduler::partition::Partition;
use worksteal::scheduler::request::{RequestState, StealRequest};
use worksteal::scheduler::victim;
use worksteal::{Config, Scheduler};

/// `Scheduler::join` only returns once the root observes quiescence; guard
/// every test against a protocol bug hanging the suite forever.
fn join_with_timeout(scheduler: Scheduler, timeout: Duration) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        scheduler.join();
        let _ = tx.send(());
    });
    if rx.recv_timeout(timeout).is_err() {
        panic!("scheduler did not reach quiescence within {timeout:?}");
    }
    handle.join().unwrap();
}

#[test]
fn two_workers_one_producer_executes_every_task_exactly_once() {
    let config = Config::default().num_workers(2).max_steal(1);
    let scheduler = Scheduler::start(config).unwrap();
    let executed = Arc::new(AtomicU64::new(0));

    for _ in 0..1000 {
        let executed = Arc::clone(&executed);
        scheduler
            .spawn(move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
    }

    join_with_timeout(scheduler, Duration::from_secs(10));
    assert_eq!(executed.load(Ordering::Relaxed), 1000);
}

#[test]
fn immediate_quiescence_with_no_tasks_terminates_without_executing_anything() {
    let config = Config::default().num_workers(4);
    let scheduler = Scheduler::start(config).unwrap();
    join_with_timeout(scheduler, Duration::from_secs(10));
}

#[test]
fn lifeline_reactivation_drains_tasks_enqueued_after_global_idle() {
    // Drive four workers single-threaded (no OS threads) so the test can
    // assert on the reconciled state between ticks rather than racing a
    // background thread pool.
    let config = Config::default().num_workers(4).max_steal(1);
    let mut partition = Partition::new(&config).unwrap();

    // Spin every worker until each has bounced its one steal request home,
    // escalated to Failed, and the whole partition is quiescent.
    for _ in 0..64 {
        for w in partition.workers.iter_mut() {
            w.tick();
        }
    }
    for w in &partition.workers {
        assert!(
            w.tree.waiting_for_tasks || w.id == 0,
            "worker {} should be waiting_for_tasks once globally idle",
            w.id
        );
    }

    let executed = Arc::new(AtomicU64::new(0));
    for _ in 0..8 {
        let executed = Arc::clone(&executed);
        partition
            .injector
            .try_send(worksteal::boxed(move || {
                executed.fetch_add(1, Ordering::Relaxed);
            }))
            .map_err(|_| "injector full")
            .unwrap();
    }

    for _ in 0..256 {
        for w in partition.workers.iter_mut() {
            w.tick();
        }
    }

    assert_eq!(executed.load(Ordering::Relaxed), 8);
    for w in &partition.workers {
        assert_eq!(w.requested, 0, "worker {} left with a dangling request", w.id);
    }
}

#[test]
fn adaptive_controller_downshifts_when_tasks_per_steal_is_fine_grained() {
    let config = Config::default().num_workers(8).steal_strategy(StealStrategy::Adaptive);
    let partition = Partition::new(&config).unwrap();
    let ctx = &partition.workers[3];

    let mut stats = ctx.stats;
    stats.num_steals_exec_recently = config.steal_adaptive_interval;
    stats.num_tasks_exec_recently = config.steal_adaptive_interval; // ratio == 1

    let next = ctx.adaptive.maybe_retune(&mut stats, true);
    assert!(!next, "stealhalf should downshift to stealone at ratio 1");
}

#[test]
fn adaptive_controller_holds_stealone_when_tasks_per_steal_is_coarse_grained() {
    let config = Config::default().num_workers(8).steal_strategy(StealStrategy::Adaptive);
    let partition = Partition::new(&config).unwrap();
    let ctx = &partition.workers[3];

    let mut stats = ctx.stats;
    stats.num_steals_exec_recently = config.steal_adaptive_interval;
    stats.num_tasks_exec_recently = config.steal_adaptive_interval * 3; // ratio == 3

    let next = ctx.adaptive.maybe_retune(&mut stats, false);
    assert!(!next, "stealone should not upshift when ratio is well above 1");
}

#[test]
fn last_victim_bias_retargets_the_worker_that_donated_last() {
    let config = Config::default().num_workers(4).steal_last_victim(true);
    let mut partition = Partition::new(&config).unwrap();
    let ctx = &mut partition.workers[0];
    ctx.last_victim = Some(1);
    ctx.shared.victim_flags[1].store(true, Ordering::Relaxed);

    let mut req = StealRequest::new(
        0,
        ctx.id as u32,
        ctx.partition,
        ctx.p_id as u32,
        Bitfield32::set_up_to(ctx.num_workers_rt),
        RequestState::Idle,
        false,
    );
    let target = victim::steal_from(
        &mut req,
        ctx.last_victim,
        ctx.id,
        &ctx.tree,
        ctx.num_workers_rt,
        ctx.max_steal_attempts,
        &mut ctx.rng,
        true,
        &ctx.shared.victim_flags,
    );
    assert_eq!(target, 1, "should retarget the worker that donated last");
}
