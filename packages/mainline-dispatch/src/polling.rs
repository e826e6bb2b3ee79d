use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use crate::error::{Fault, panic_message};
use crate::host::FailureSink;
use crate::lock;
use crate::metrics::SchedulerMetrics;

/// A condition checked once per tick. Returning true means the deferred
/// action it guards has finished and the predicate can be dropped.
pub type Predicate = Box<dyn FnMut() -> bool + Send + 'static>;

/// Identifies one entry added to a [`PollingSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollToken(u64);

struct PollEntry {
    token: PollToken,
    // Set once the predicate has returned true or panicked; never evaluated again after that.
    done: AtomicBool,
    predicate: Mutex<Predicate>,
}

/// The active polling predicates.
///
/// Evaluation walks the list by index, taking the lock only long enough to
/// clone the next entry, so predicates may add entries or cancel jobs while
/// a pass is running.
pub struct PollingSet {
    active: Mutex<Vec<Arc<PollEntry>>>,
    // Reused across passes to avoid allocating on every tick.
    completed: Mutex<Vec<PollToken>>,
    next_token: AtomicU64,
    sink: Arc<dyn FailureSink>,
    metrics: Arc<SchedulerMetrics>,
}

impl PollingSet {
    pub fn new(sink: Arc<dyn FailureSink>, metrics: Arc<SchedulerMetrics>) -> Self {
        Self {
            active: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            sink,
            metrics,
        }
    }

    pub fn add(&self, predicate: Predicate) -> PollToken {
        let token = PollToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(PollEntry {
            token,
            done: AtomicBool::new(false),
            predicate: Mutex::new(predicate),
        });
        lock(&self.active).push(entry);
        token
    }

    /// True while the entry is still in the active set.
    pub fn contains(&self, token: PollToken) -> bool {
        lock(&self.active).iter().any(|entry| entry.token == token)
    }

    pub fn len(&self) -> usize {
        lock(&self.active).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.active).is_empty()
    }

    /// Evaluates every active predicate once and removes the ones that
    /// completed. Returns how many remain active.
    ///
    /// If the list shrinks under the cursor (a nested pass removed entries),
    /// the pass stops early instead of restarting.
    pub fn evaluate_all(&self) -> usize {
        // A nested pass finds the buffer already taken and starts from an empty one.
        let mut completed = std::mem::take(&mut *lock(&self.completed));

        let mut index = 0;
        loop {
            let entry = match lock(&self.active).get(index) {
                Some(entry) => Arc::clone(entry),
                None => break,
            };
            index += 1;

            if self.evaluate(&entry) {
                completed.push(entry.token);
            }
        }

        let remaining = {
            let mut active = lock(&self.active);
            if !completed.is_empty() {
                active.retain(|entry| !completed.contains(&entry.token));
            }
            active.len()
        };

        tracing::trace!(evaluated = index, completed = completed.len(), remaining, "polling pass");

        completed.clear();
        let mut slot = lock(&self.completed);
        if completed.capacity() > slot.capacity() {
            *slot = completed;
        }

        remaining
    }

    fn evaluate(&self, entry: &PollEntry) -> bool {
        if entry.done.load(Ordering::Acquire) {
            return true;
        }

        let mut predicate = match entry.predicate.try_lock() {
            Ok(predicate) => predicate,
            // Already being evaluated further up the stack.
            Err(TryLockError::WouldBlock) => return false,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let done = match panic::catch_unwind(AssertUnwindSafe(|| (*predicate)())) {
            Ok(done) => done,
            Err(payload) => {
                self.metrics.record_predicate_fault();
                self.sink.report(&Fault::Predicate {
                    message: panic_message(payload.as_ref()),
                });
                true
            }
        };

        if done {
            entry.done.store(true, Ordering::Release);
        }
        done
    }
}
