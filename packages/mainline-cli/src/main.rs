use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use clap::Parser;
use mainline_dispatch::{
    Dispatcher, ManualTickSource, RunMode, Scheduler, SchedulerConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mainline")]
#[command(about = "Drive the main-thread scheduler from a host loop", long_about = None)]
struct Cli {
    /// Run without a recurring tick: submitted work runs synchronously and polling blocks
    #[arg(long)]
    batch: bool,

    /// Threads submitting work concurrently
    #[arg(long, default_value_t = 4)]
    producers: usize,

    /// Jobs each producer queues, and again as many delayed jobs
    #[arg(long, default_value_t = 25)]
    jobs: usize,

    /// Delay for scheduled jobs, in milliseconds
    #[arg(long, default_value_t = 50)]
    delay_ms: u64,

    /// Host tick period in interactive mode, in milliseconds
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,

    /// Batch-mode polling interval, in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    if cli.producers == 0 {
        bail!("--producers must be at least 1");
    }
    if cli.tick_ms == 0 || cli.poll_interval_ms == 0 {
        bail!("--tick-ms and --poll-interval-ms must be positive");
    }

    let mode = if cli.batch {
        RunMode::Batch
    } else {
        RunMode::Interactive
    };
    let ticks = Arc::new(ManualTickSource::new());
    let scheduler = Scheduler::builder()
        .tick_source(ticks.clone())
        .batch_mode(mode)
        .config(
            SchedulerConfig::default()
                .with_poll_interval(Duration::from_millis(cli.poll_interval_ms)),
        )
        .build();

    tracing::info!(?mode, producers = cli.producers, jobs = cli.jobs, "starting");
    let started = Instant::now();

    let executed = Arc::new(AtomicUsize::new(0));
    let expected = cli.producers * cli.jobs * 2;
    submit(&scheduler, &cli, &executed)?;

    let finished = Arc::new(AtomicBool::new(false));
    {
        let executed = executed.clone();
        let finished = finished.clone();
        scheduler.poll_until_complete(move || {
            let done = executed.load(Ordering::SeqCst) >= expected;
            if done {
                finished.store(true, Ordering::SeqCst);
            }
            done
        });
    }

    // In batch mode the call above already blocked until everything ran.
    let tick = Duration::from_millis(cli.tick_ms);
    while !finished.load(Ordering::SeqCst) {
        ticks.tick();
        thread::sleep(tick);
    }

    let metrics = scheduler.metrics();
    tracing::info!(
        elapsed = ?started.elapsed(),
        executed = metrics.jobs_executed,
        faults = metrics.job_faults + metrics.predicate_faults,
        "all jobs executed on the main thread"
    );
    Ok(())
}

fn submit(scheduler: &Arc<Scheduler>, cli: &Cli, executed: &Arc<AtomicUsize>) -> Result<()> {
    let delay = Duration::from_millis(cli.delay_ms);
    let main = scheduler.main_thread();

    let producers: Vec<_> = (0..cli.producers)
        .map(|producer| {
            let dispatcher: Arc<dyn Dispatcher> = scheduler.clone();
            let executed = executed.clone();
            let jobs = cli.jobs;
            thread::spawn(move || {
                for job in 0..jobs {
                    let queued = executed.clone();
                    dispatcher.run_job(
                        Box::new(move || {
                            debug_assert!(main.is_current());
                            queued.fetch_add(1, Ordering::SeqCst);
                        }),
                        true,
                    );

                    let delayed = executed.clone();
                    let id = dispatcher.schedule_job(
                        Box::new(move || {
                            delayed.fetch_add(1, Ordering::SeqCst);
                        }),
                        delay,
                    );
                    tracing::trace!(producer, job, %id, "submitted");
                }
            })
        })
        .collect();

    for producer in producers {
        producer
            .join()
            .map_err(|_| anyhow!("producer thread panicked"))?;
    }
    Ok(())
}
