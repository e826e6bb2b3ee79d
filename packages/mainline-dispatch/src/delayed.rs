use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::clock::Clock;
use crate::host::{BatchMode, FailureSink};
use crate::ids::{IdentifierAllocator, JobId};
use crate::lock;
use crate::metrics::SchedulerMetrics;
use crate::polling::{PollToken, PollingSet};
use crate::queue::{Job, run_guarded};

#[derive(Default)]
struct Registry {
    ids: IdentifierAllocator,
    jobs: FxHashMap<JobId, Job>,
}

/// Jobs waiting for their delay to elapse.
///
/// Each scheduled job is paired with a polling predicate that fires it once
/// due. A job leaves the map exactly once: either when it fires or when it is
/// cancelled.
pub struct DelayedJobRegistry {
    // The allocator shares this lock with the map so that no two callers
    // can be handed the same identifier before either inserts.
    state: Mutex<Registry>,
    clock: Arc<dyn Clock>,
    mode: Arc<dyn BatchMode>,
    sink: Arc<dyn FailureSink>,
    metrics: Arc<SchedulerMetrics>,
}

impl DelayedJobRegistry {
    pub fn new(
        clock: Arc<dyn Clock>,
        mode: Arc<dyn BatchMode>,
        sink: Arc<dyn FailureSink>,
        metrics: Arc<SchedulerMetrics>,
    ) -> Self {
        Self {
            state: Mutex::new(Registry::default()),
            clock,
            mode,
            sink,
            metrics,
        }
    }

    /// Stores `job` and registers a predicate with `polling` that runs it
    /// once `delay` has elapsed. The job never runs synchronously here, even
    /// with a zero delay; the earliest it can run is the next polling pass.
    ///
    /// In batch mode the delay is dropped: there is no tick to let time pass.
    /// The returned token names the job's predicate in `polling`.
    pub fn schedule(
        self: &Arc<Self>,
        job: Job,
        delay: Duration,
        polling: &PollingSet,
    ) -> (JobId, PollToken) {
        let delay = if self.mode.is_batch_mode() {
            Duration::ZERO
        } else {
            delay
        };
        let scheduled_at = self.clock.now();

        let id = {
            let mut state = lock(&self.state);
            let Registry { ids, jobs } = &mut *state;
            let id = ids.next_free(|candidate| jobs.contains_key(&candidate));
            jobs.insert(id, job);
            id
        };

        let registry = Arc::clone(self);
        let token = polling.add(Box::new(move || registry.is_due(id, scheduled_at, delay)));

        tracing::debug!(%id, ?delay, "job scheduled");
        (id, token)
    }

    /// Removes the job if it is still pending. Returns whether it was.
    ///
    /// A job that has already been taken for execution is not interrupted.
    pub fn cancel(&self, id: JobId) -> bool {
        let removed = lock(&self.state).jobs.remove(&id).is_some();
        if removed {
            tracing::debug!(%id, "job cancelled");
        }
        removed
    }

    pub fn contains(&self, id: JobId) -> bool {
        lock(&self.state).jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        lock(&self.state).jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).jobs.is_empty()
    }

    /// Polling predicate behind every scheduled job.
    ///
    /// Once due, the job is taken out of the map under the lock and run on
    /// the calling thread; a cancel racing with it finds nothing to remove.
    /// Returns true whether or not the job was still there. A job that was
    /// cancelled before its time also returns true so its predicate is pruned.
    fn is_due(&self, id: JobId, scheduled_at: Duration, delay: Duration) -> bool {
        let elapsed = self.clock.now().saturating_sub(scheduled_at);
        if elapsed < delay {
            return !self.contains(id);
        }

        let job = lock(&self.state).jobs.remove(&id);
        if let Some(job) = job {
            tracing::trace!(%id, ?elapsed, "job due");
            run_guarded(job, self.sink.as_ref(), &self.metrics);
        }
        true
    }
}
