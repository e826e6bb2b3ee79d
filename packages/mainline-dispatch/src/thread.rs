use std::thread::{self, ThreadId};

/// Identity of the thread every job body and predicate runs on.
///
/// Captured exactly once, when the scheduler is built. Building the scheduler
/// on any thread other than the real main thread makes every later
/// `is_current` answer wrong; nothing detects or repairs that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MainThread {
    id: ThreadId,
}

impl MainThread {
    /// Records the calling thread as the main thread.
    pub fn capture() -> Self {
        Self {
            id: thread::current().id(),
        }
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }
}
