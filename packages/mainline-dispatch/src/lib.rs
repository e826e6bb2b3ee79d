//! Main-thread affinity scheduling.
//!
//! Jobs submitted from any thread execute only on the thread that built the
//! [`Scheduler`]. The host drives execution through a recurring tick, or, in
//! batch mode where no tick exists, work runs synchronously and polling
//! blocks in place.

pub mod clock;
pub mod config;
pub mod delayed;
pub mod error;
pub mod host;
pub mod ids;
pub mod metrics;
pub mod polling;
pub mod queue;
pub mod scheduler;
pub mod thread;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::Fault;
pub use host::{
    BatchMode, FailureSink, ManualTickSource, RunMode, SubscriptionKey, TickCallback, TickSource,
    TracingSink,
};
pub use ids::JobId;
pub use metrics::MetricsSnapshot;
pub use polling::{PollToken, Predicate};
pub use queue::Job;
pub use scheduler::{Scheduler, SchedulerBuilder};

/// Object-safe submission interface, for code that hands work to the main
/// thread without knowing which scheduler backs it.
pub trait Dispatcher: Send + Sync {
    /// Queue a job for the main thread. With `run_immediately` set and the
    /// caller already on the main thread, the queue is drained inline.
    fn run_job(&self, job: Job, run_immediately: bool);

    /// Run a job on the main thread after `delay`.
    fn schedule_job(&self, job: Job, delay: Duration) -> JobId;

    /// Cancel a delayed job that has not fired yet.
    fn cancel_job(&self, id: JobId) -> bool;

    /// Re-evaluate a predicate each tick until it returns true.
    fn poll_until(&self, predicate: Predicate);
}

// Job bodies never run under these locks, so poisoning carries no information.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
