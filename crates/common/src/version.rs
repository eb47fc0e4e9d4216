//! Optimistic-concurrency stamp.

use serde::{Deserialize, Serialize};

/// A monotonically increasing version stamp on an aggregate row.
///
/// Writers read the current stamp, mutate in memory, and persist with a
/// compare-and-swap on the stamp. A stale stamp is reported as a retryable
/// conflict rather than silently overwriting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// The version of a freshly created aggregate.
    pub const fn initial() -> Self {
        Self(0)
    }

    /// Wraps a raw stamp value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the stamp after one more write.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw stamp value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
