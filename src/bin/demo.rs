//! Command-line demo: fan out a configurable number of no-op-ish tasks
//! across a partition and report how long draining them took.

use clap::Parser;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use worksteal::{Config, Scheduler, StealStrategy};

/// Run a synthetic fan-out/fan-in workload on the work-stealing scheduler.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of worker threads.
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Number of tasks to spawn on the root worker.
    #[arg(short, long, default_value_t = 100_000)]
    tasks: usize,

    /// Max concurrent outstanding steal requests per worker.
    #[arg(long, default_value_t = 1)]
    max_steal: usize,

    /// Steal strategy: one, half, or adaptive.
    #[arg(long, default_value = "adaptive")]
    strategy: String,

    /// Enable the VictimCheck has-tasks hint.
    #[arg(long)]
    victim_check: bool,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let strategy = match args.strategy.as_str() {
        "one" => StealStrategy::One,
        "half" => StealStrategy::Half,
        "adaptive" => StealStrategy::Adaptive,
        other => {
            eprintln!("unknown strategy '{other}', falling back to adaptive");
            StealStrategy::Adaptive
        }
    };

    let config = Config::default()
        .num_workers(args.workers)
        .max_steal(args.max_steal)
        .steal_strategy(strategy)
        .victim_check(args.victim_check)
        .apply_env_overrides();

    let scheduler = match Scheduler::start(config) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("failed to start scheduler: {err}");
            std::process::exit(1);
        }
    };

    let completed = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    for i in 0..args.tasks {
        let completed = Arc::clone(&completed);
        let spawned = scheduler.spawn(move || {
            // A cheap, data-dependent bit of work so the optimizer can't
            // elide it, roughly standing in for real task bodies.
            let mut acc = i as u64;
            for _ in 0..32 {
                acc = acc.wrapping_mul(2654435761).wrapping_add(1);
            }
            std::hint::black_box(acc);
            completed.fetch_add(1, Ordering::Relaxed);
        });
        if spawned.is_err() {
            eprintln!("scheduler rejected task {i}");
            break;
        }
    }

    scheduler.join();
    let elapsed = start.elapsed();
    let done = completed.load(Ordering::Relaxed);
    println!(
        "ran {done} tasks across {} workers in {:.3}s ({:.0} tasks/sec)",
        args.workers,
        elapsed.as_secs_f64(),
        done as f64 / elapsed.as_secs_f64().max(1e-9)
    );
}
