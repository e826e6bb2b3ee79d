use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::delayed::DelayedJobRegistry;
use crate::error::Fault;
use crate::host::{BatchMode, FailureSink, RunMode, SubscriptionKey, TickSource, TracingSink};
use crate::ids::JobId;
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};
use crate::polling::{PollToken, PollingSet};
use crate::queue::MainThreadQueue;
use crate::thread::MainThread;
use crate::{Dispatcher, Job, Predicate};

/// Runs jobs on one designated thread no matter which thread submits them.
///
/// Work arrives three ways: queued one-shot jobs ([`run`](Self::run)),
/// delayed jobs ([`schedule`](Self::schedule)) and condition-gated polling
/// ([`poll_until_complete`](Self::poll_until_complete)). All of it executes
/// inside [`execute_all`](Self::execute_all), which the host tick calls on the
/// main thread. In batch mode there is no tick, so work submitted from the
/// main thread runs synchronously and polling blocks in place.
pub struct Scheduler {
    main_thread: MainThread,
    queue: MainThreadQueue,
    polling: PollingSet,
    delayed: Arc<DelayedJobRegistry>,
    tick_source: Option<Arc<dyn TickSource>>,
    mode: Arc<dyn BatchMode>,
    sink: Arc<dyn FailureSink>,
    metrics: Arc<SchedulerMetrics>,
    config: SchedulerConfig,
    subscription: SubscriptionKey,
    subscribed: AtomicBool,
    this: Weak<Scheduler>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    /// An interactive scheduler with no tick source; the host calls
    /// [`execute_all`](Self::execute_all) itself. Must be called on the main thread.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    /// Queues `job` and, when called on the main thread, drains the queue on
    /// the spot. Jobs queued earlier run first.
    pub fn run<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.run_with(job, true);
    }

    /// Like [`run`](Self::run), but only drains inline when
    /// `run_immediately` is true. Otherwise the job waits for the next tick.
    pub fn run_with<F>(&self, job: F, run_immediately: bool)
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_subscribed();
        self.queue.enqueue(Box::new(job));
        if run_immediately && self.main_thread.is_current() {
            self.queue.drain_all();
        }
    }

    /// Runs `job` on the main thread once `delay` has elapsed. The returned
    /// identifier is never zero and can be passed to [`cancel`](Self::cancel).
    ///
    /// In batch mode, on the main thread, the delay is dropped and this
    /// blocks until the job has run, the same way
    /// [`poll_until_complete`](Self::poll_until_complete) does.
    pub fn schedule<F>(&self, job: F, delay: Duration) -> JobId
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_subscribed();
        let (id, token) = self.delayed.schedule(Box::new(job), delay, &self.polling);

        if self.mode.is_batch_mode() && self.main_thread.is_current() {
            self.block_until_complete(token);
        }
        id
    }

    /// Best-effort cancellation of a delayed job. Unknown, already fired and
    /// already cancelled identifiers are ignored. Returns whether a pending
    /// job was removed.
    pub fn cancel(&self, id: JobId) -> bool {
        self.delayed.cancel(id)
    }

    /// Re-evaluates `predicate` every tick until it returns true.
    ///
    /// In batch mode, on the main thread, this blocks: it drains the queue,
    /// evaluates all predicates and sleeps for the configured poll interval
    /// until `predicate` has completed.
    pub fn poll_until_complete<P>(&self, predicate: P)
    where
        P: FnMut() -> bool + Send + 'static,
    {
        self.ensure_subscribed();
        let token = self.polling.add(Box::new(predicate));

        if self.mode.is_batch_mode() && self.main_thread.is_current() {
            self.block_until_complete(token);
        }
    }

    fn block_until_complete(&self, token: PollToken) {
        tracing::debug!(?token, interval = ?self.config.poll_interval, "blocking until predicate completes");
        loop {
            self.queue.drain_all();
            self.polling.evaluate_all();
            if !self.polling.contains(token) {
                break;
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// The tick entry point: drains the main-thread queue, then evaluates
    /// every polling predicate once. Called off the main thread it reports
    /// [`Fault::WrongThread`] and does nothing.
    pub fn execute_all(&self) {
        if !self.main_thread.is_current() {
            let fault = Fault::WrongThread {
                operation: "execute_all",
                thread: format!("{:?}", thread::current().id()),
            };
            tracing::warn!(%fault, "tick ignored");
            self.sink.report(&fault);
            return;
        }

        self.queue.drain_all();
        self.polling.evaluate_all();
    }

    /// Subscribes to the tick source again, e.g. after the host reloaded.
    /// The previous registration is removed first. Does nothing in batch mode.
    pub fn resubscribe(&self) {
        if self.mode.is_batch_mode() {
            return;
        }
        if let Some(source) = &self.tick_source {
            self.subscribed.store(true, Ordering::Release);
            self.subscribe_to(source.as_ref());
        }
    }

    fn ensure_subscribed(&self) {
        if self.subscribed.load(Ordering::Acquire) || self.mode.is_batch_mode() {
            return;
        }
        let Some(source) = &self.tick_source else {
            return;
        };
        if self.subscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscribe_to(source.as_ref());
    }

    fn subscribe_to(&self, source: &dyn TickSource) {
        let this = self.this.clone();
        source.unsubscribe(self.subscription);
        source.subscribe(
            self.subscription,
            Arc::new(move || {
                if let Some(scheduler) = this.upgrade() {
                    scheduler.execute_all();
                }
            }),
        );
        tracing::debug!(key = ?self.subscription, "subscribed to host tick");
    }

    pub fn is_main_thread(&self) -> bool {
        self.main_thread.is_current()
    }

    pub fn main_thread(&self) -> MainThread {
        self.main_thread
    }

    pub fn is_batch_mode(&self) -> bool {
        self.mode.is_batch_mode()
    }

    /// No queued jobs and no active polling entries.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.polling.is_empty()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_executed: self.metrics.jobs_executed(),
            job_faults: self.metrics.job_faults(),
            predicate_faults: self.metrics.predicate_faults(),
            queued_jobs: self.queue.len(),
            delayed_jobs: self.delayed.len(),
            active_polls: self.polling.len(),
        }
    }
}

impl Dispatcher for Scheduler {
    fn run_job(&self, job: Job, run_immediately: bool) {
        self.run_with(job, run_immediately);
    }

    fn schedule_job(&self, job: Job, delay: Duration) -> JobId {
        self.schedule(job, delay)
    }

    fn cancel_job(&self, id: JobId) -> bool {
        self.cancel(id)
    }

    fn poll_until(&self, predicate: Predicate) {
        self.poll_until_complete(predicate);
    }
}

/// Wires a [`Scheduler`] to its host collaborators.
pub struct SchedulerBuilder {
    tick_source: Option<Arc<dyn TickSource>>,
    mode: Arc<dyn BatchMode>,
    sink: Arc<dyn FailureSink>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self {
            tick_source: None,
            mode: Arc::new(RunMode::Interactive),
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock::new()),
            config: SchedulerConfig::default(),
        }
    }
}

impl SchedulerBuilder {
    pub fn tick_source(mut self, source: Arc<dyn TickSource>) -> Self {
        self.tick_source = Some(source);
        self
    }

    pub fn batch_mode(mut self, mode: impl BatchMode + 'static) -> Self {
        self.mode = Arc::new(mode);
        self
    }

    pub fn failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the scheduler and captures the calling thread as the main
    /// thread. Must be called on the thread that will drive ticks.
    pub fn build(self) -> Arc<Scheduler> {
        let metrics = Arc::new(SchedulerMetrics::default());
        let scheduler = Arc::new_cyclic(|this| Scheduler {
            main_thread: MainThread::capture(),
            queue: MainThreadQueue::new(self.sink.clone(), metrics.clone()),
            polling: PollingSet::new(self.sink.clone(), metrics.clone()),
            delayed: Arc::new(DelayedJobRegistry::new(
                self.clock,
                self.mode.clone(),
                self.sink.clone(),
                metrics.clone(),
            )),
            tick_source: self.tick_source,
            mode: self.mode,
            sink: self.sink,
            metrics,
            config: self.config,
            subscription: SubscriptionKey::unique(),
            subscribed: AtomicBool::new(false),
            this: this.clone(),
        });
        scheduler.ensure_subscribed();
        tracing::debug!(batch = scheduler.is_batch_mode(), "scheduler started");
        scheduler
    }
}
