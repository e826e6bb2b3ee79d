use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals, shared by the queue, the polling set and the delayed
/// registry.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    jobs_executed: AtomicU64,
    job_faults: AtomicU64,
    predicate_faults: AtomicU64,
}

impl SchedulerMetrics {
    pub(crate) fn record_job(&self) {
        self.jobs_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_job_fault(&self) {
        self.job_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_predicate_fault(&self) {
        self.predicate_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_executed(&self) -> u64 {
        self.jobs_executed.load(Ordering::Relaxed)
    }

    pub fn job_faults(&self) -> u64 {
        self.job_faults.load(Ordering::Relaxed)
    }

    pub fn predicate_faults(&self) -> u64 {
        self.predicate_faults.load(Ordering::Relaxed)
    }
}

/// Point-in-time view returned by `Scheduler::metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Jobs that ran to completion, queued and delayed alike.
    pub jobs_executed: u64,
    pub job_faults: u64,
    pub predicate_faults: u64,
    pub queued_jobs: usize,
    pub delayed_jobs: usize,
    pub active_polls: usize,
}
