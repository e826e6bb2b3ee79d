use std::any::Any;

use thiserror::Error;

/// Failures the scheduler reports to its `FailureSink`.
///
/// None of these ever propagate out of the driving loop; each one ends the
/// job or predicate that caused it and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// A job body panicked. The job is discarded, not retried.
    #[error("job panicked: {message}")]
    Job { message: String },

    /// A polling predicate panicked. It is treated as complete and removed.
    #[error("polling predicate panicked: {message}")]
    Predicate { message: String },

    /// A main-thread-only entry point was called from another thread.
    #[error("{operation} must run on the main thread, called from {thread}")]
    WrongThread {
        operation: &'static str,
        thread: String,
    },
}

/// Best-effort text for a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
