use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crate::error::{Fault, panic_message};
use crate::host::FailureSink;
use crate::lock;
use crate::metrics::SchedulerMetrics;

/// A unit of work. Ownership moves into whichever container holds it and is
/// dropped right after it runs or is cancelled.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs `job`, turning a panic into a reported [`Fault::Job`].
/// Returns false if the job panicked.
pub(crate) fn run_guarded(job: Job, sink: &dyn FailureSink, metrics: &SchedulerMetrics) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => {
            metrics.record_job();
            true
        }
        Err(payload) => {
            metrics.record_job_fault();
            sink.report(&Fault::Job {
                message: panic_message(payload.as_ref()),
            });
            false
        }
    }
}

/// FIFO of jobs waiting to run on the main thread.
///
/// Any thread may enqueue. Jobs are popped under the lock and run after it is
/// released, so a job may enqueue more work without deadlocking.
pub struct MainThreadQueue {
    queue: Mutex<VecDeque<Job>>,
    sink: Arc<dyn FailureSink>,
    metrics: Arc<SchedulerMetrics>,
}

impl MainThreadQueue {
    pub fn new(sink: Arc<dyn FailureSink>, metrics: Arc<SchedulerMetrics>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            sink,
            metrics,
        }
    }

    pub fn enqueue(&self, job: Job) {
        let mut queue = lock(&self.queue);
        queue.push_back(job);
        tracing::trace!(queued = queue.len(), "job enqueued");
    }

    /// Runs the front job, if any. A panicking job counts as done.
    /// Returns false when the queue was empty.
    pub fn drain_one(&self) -> bool {
        // The guard must be gone before the job runs.
        let job = lock(&self.queue).pop_front();
        match job {
            Some(job) => {
                run_guarded(job, self.sink.as_ref(), &self.metrics);
                true
            }
            None => false,
        }
    }

    /// Runs jobs until the queue is empty, including jobs enqueued by the
    /// jobs themselves.
    pub fn drain_all(&self) {
        let mut drained = 0usize;
        while self.drain_one() {
            drained += 1;
        }
        if drained > 0 {
            tracing::trace!(drained, "main-thread queue drained");
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.queue).is_empty()
    }
}
