//! Candidate identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identifier of a decomposition candidate.
///
/// Issued by the repository when a candidate is created and stable
/// thereafter, except on explicit relabeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(u64);

impl CandidateId {
    /// Create a candidate id from a raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for CandidateId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Monotonic id source.
///
/// Safe to share between threads; every call to [`IdAllocator::next_id`]
/// returns a fresh id.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Issue the next id.
    pub fn next_id(&self) -> CandidateId {
        CandidateId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
