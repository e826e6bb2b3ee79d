//! Capabilities the host application provides to the scheduler: a recurring
//! tick, a batch-mode query, and somewhere to report failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::error::Fault;
use crate::lock;

/// Callback a [`TickSource`] invokes on the main thread once per tick.
pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// Names one subscription on a [`TickSource`]. Closures have no identity, so
/// the key is what `unsubscribe` matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey(u64);

impl SubscriptionKey {
    /// A key no other call in this process has returned.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The host's periodic update event.
///
/// Implementations behave like a multicast delegate: subscribing the same
/// key twice registers it twice. Callers that must not double-register call
/// `unsubscribe` first.
pub trait TickSource: Send + Sync {
    fn subscribe(&self, key: SubscriptionKey, callback: TickCallback);
    fn unsubscribe(&self, key: SubscriptionKey);
}

/// Answers whether the process runs without a recurring tick.
pub trait BatchMode: Send + Sync {
    fn is_batch_mode(&self) -> bool;
}

impl<F> BatchMode for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_batch_mode(&self) -> bool {
        self()
    }
}

/// A fixed answer to [`BatchMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Interactive,
    Batch,
}

impl BatchMode for RunMode {
    fn is_batch_mode(&self) -> bool {
        matches!(self, RunMode::Batch)
    }
}

/// Receives faults from job bodies, predicates and misrouted tick calls.
pub trait FailureSink: Send + Sync {
    fn report(&self, fault: &Fault);
}

/// Reports faults through `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FailureSink for TracingSink {
    fn report(&self, fault: &Fault) {
        tracing::error!(%fault, "scheduler fault");
    }
}

/// A tick source the host drives by calling [`tick`](Self::tick) from its
/// own loop.
#[derive(Default)]
pub struct ManualTickSource {
    subscribers: Mutex<SmallVec<[(SubscriptionKey, TickCallback); 2]>>,
}

impl ManualTickSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invokes every subscribed callback once, in subscription order.
    /// Callbacks may subscribe or unsubscribe; changes apply from the next tick.
    pub fn tick(&self) {
        let callbacks: SmallVec<[TickCallback; 2]> = lock(&self.subscribers)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl TickSource for ManualTickSource {
    fn subscribe(&self, key: SubscriptionKey, callback: TickCallback) {
        lock(&self.subscribers).push((key, callback));
    }

    fn unsubscribe(&self, key: SubscriptionKey) {
        lock(&self.subscribers).retain(|(k, _)| *k != key);
    }
}
