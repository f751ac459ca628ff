//! Error types for job and task coordination.

use alder_cache::CacheError;
use alder_core::TreeStoreError;
use snafu::Snafu;

/// Errors from [`crate::JobCoordinator`] operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum JobError {
    /// The operation needs state this instance does not have yet (no
    /// registered worker, usually).
    #[snafu(display("{operation} requires prior initialization"))]
    NotInitialized {
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// A caller-supplied identifier was unusable.
    #[snafu(display("invalid argument: {reason}"))]
    InvalidArgument {
        /// What was wrong.
        reason: String,
    },

    /// The addressed job, task, or worker does not exist.
    #[snafu(display("{what} not found"))]
    NotFound {
        /// What was looked for.
        what: String,
    },

    /// Creation refused because the entity already exists on this instance.
    #[snafu(display("{what} already exists"))]
    AlreadyExists {
        /// What collided.
        what: String,
    },

    /// A bounded wait ran out of budget.
    #[snafu(display("{operation} timed out"))]
    TimedOut {
        /// Operation that was waiting.
        operation: &'static str,
    },

    /// An invariant did not hold (malformed assigned path, usually).
    #[snafu(display("unexpected state: {reason}"))]
    Unexpected {
        /// What was violated.
        reason: String,
    },

    /// The tree store failed.
    #[snafu(display("tree store error: {source}"))]
    Storage {
        /// The underlying error.
        source: TreeStoreError,
    },

    /// The injected lock provider failed.
    #[snafu(display("lock error: {source}"))]
    Lock {
        /// The underlying error.
        source: CacheError,
    },
}

impl From<TreeStoreError> for JobError {
    fn from(source: TreeStoreError) -> Self {
        JobError::Storage { source }
    }
}
