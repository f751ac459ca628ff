//! Error types for cache-layer operations.

use alder_core::CacheStoreError;
use snafu::Snafu;

/// Errors from [`crate::CacheClient`] operations.
///
/// `NotFound` and `TimedOut` are logical outcomes the caller branches on;
/// they are never retried internally. `CommunicationFailure` is terminal for
/// the call that surfaced it: the one bounded reconnect-and-retry has already
/// happened by the time it is returned.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CacheError {
    /// A caller-supplied identifier or duration was unusable.
    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument {
        /// What was wrong.
        reason: String,
    },

    /// The addressed item is not set.
    #[snafu(display("cache item '{key}' not found"))]
    NotFound {
        /// Compound key that was addressed.
        key: String,
    },

    /// A bounded wait (lock acquisition or value wait) ran out of budget.
    #[snafu(display("{operation} timed out after {waited_ms}ms"))]
    TimedOut {
        /// Operation that was waiting.
        operation: &'static str,
        /// How long it waited.
        waited_ms: u64,
    },

    /// Transport failed and the single reconnect-and-retry did not recover.
    #[snafu(display("cache communication failure: {reason}"))]
    CommunicationFailure {
        /// What went wrong.
        reason: String,
    },

    /// The server answered with something the command cannot use.
    #[snafu(display("cache store error: {source}"))]
    Store {
        /// The underlying error.
        source: CacheStoreError,
    },

    /// An internal invariant did not hold.
    #[snafu(display("unexpected cache state: {reason}"))]
    Unexpected {
        /// What was violated.
        reason: String,
    },
}

impl From<CacheStoreError> for CacheError {
    fn from(source: CacheStoreError) -> Self {
        CacheError::Store { source }
    }
}
