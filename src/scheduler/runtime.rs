//! Top-level scheduler entry point: spawns one OS thread per worker and
//! exposes a handle for submitting work and waiting for completion.
//!
//! Mirrors the teacher's own `WorkStealingExecutor::spawn_workers`/`run`
//! idiom (`thread::Builder::new().name(...).spawn(...)`), adapted to this
//! scheduler's non-blocking, poll-driven worker loop instead of a
//! park/condvar executor.

use crate::scheduler::config::Config;
use crate::scheduler::error::{SchedResult, SchedulerError};
use crate::scheduler::partition::Partition;
use crate::scheduler::task::{boxed, BoxedTask};
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// A running partition: worker threads plus the means to feed it work and
/// wait for quiescence.
pub struct Scheduler {
    partition: Option<Partition>,
    threads: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Validate `config`, build the partition, and spawn one thread per
    /// worker. Threads start running immediately; call [`Scheduler::spawn`]
    /// to submit work and [`Scheduler::join`] to wait for quiescence.
    pub fn start(config: Config) -> SchedResult<Scheduler> {
        let mut partition = Partition::new(&config)?;
        let num_workers = partition.num_workers;
        info!(num_workers, max_steal = config.max_steal, "starting scheduler");

        let mut workers = std::mem::take(&mut partition.workers);
        let mut threads = Vec::with_capacity(num_workers);
        for (id, mut ctx) in workers.drain(..).enumerate() {
            let handle = thread::Builder::new()
                .name(format!("worksteal-{id}"))
                .spawn(move || ctx.run())
                .expect("failed to spawn worker thread");
            threads.push(handle);
        }

        Ok(Scheduler {
            partition: Some(partition),
            threads,
        })
    }

    /// Submit a closure as a new task on the root worker. Safe to call from
    /// any thread, including before any worker thread has observed work.
    pub fn spawn<F>(&self, task: F) -> SchedResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_boxed(boxed(task))
    }

    fn spawn_boxed(&self, task: BoxedTask) -> SchedResult<()> {
        let partition = self
            .partition
            .as_ref()
            .expect("partition is only taken in Drop");
        partition
            .injector
            .try_send(task)
            .map_err(|_| SchedulerError::WorkerBlocked {
                worker: 0,
                target: 0,
                attempts: 0,
            })
    }

    /// Block the calling thread until every worker has observed global
    /// quiescence, then join their threads.
    pub fn join(mut self) {
        if let Some(partition) = &self.partition {
            while !partition.tasking_done.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_micros(100));
            }
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// Force every worker to stop at its next tick, without waiting for
    /// quiescence, then join their threads. Any tasks still queued are
    /// dropped.
    pub fn shutdown(mut self) {
        if let Some(partition) = &self.partition {
            partition.tasking_done.store(true, Ordering::Relaxed);
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}
