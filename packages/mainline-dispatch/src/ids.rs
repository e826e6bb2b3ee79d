use std::fmt;
use std::num::NonZeroU32;

/// Identifier of a delayed job, returned by `Scheduler::schedule`.
///
/// Zero is reserved as "no identifier" and is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(NonZeroU32);

impl JobId {
    /// Returns `None` for the reserved value zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Issues job identifiers 1, 2, 3, ... and wraps from `u32::MAX` back to 1.
///
/// The allocator itself is not synchronized. `DelayedJobRegistry` keeps it
/// behind the same lock as its job map so that allocating an identifier and
/// inserting the job happen as one step.
#[derive(Debug)]
pub struct IdentifierAllocator {
    next: NonZeroU32,
}

impl Default for IdentifierAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierAllocator {
    pub fn new() -> Self {
        Self {
            next: NonZeroU32::MIN,
        }
    }

    /// Starts the sequence at `first` instead of 1.
    pub fn starting_at(first: JobId) -> Self {
        Self { next: first.0 }
    }

    pub fn next(&mut self) -> JobId {
        let id = self.next;
        self.next = NonZeroU32::new(id.get().wrapping_add(1)).unwrap_or(NonZeroU32::MIN);
        JobId(id)
    }

    /// Like [`next`](Self::next), but skips identifiers for which `in_use`
    /// returns true. Only matters after the counter has wrapped.
    pub fn next_free(&mut self, in_use: impl Fn(JobId) -> bool) -> JobId {
        loop {
            let id = self.next();
            if !in_use(id) {
                return id;
            }
        }
    }
}
