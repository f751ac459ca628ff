//! Job and task coordination over the hierarchical tree store.
//!
//! A pool of worker processes pulls tasks belonging to named jobs from a
//! shared tree. This crate provides:
//!
//! - [`TreeNamespace`] - the deterministic path layout under a cluster root
//! - [`JobCoordinator`] - job lifecycle (reference-counted create/terminate),
//!   worker registry (session-bound ephemeral identity), the task queue
//!   protocol (enqueue/lease/finish/release/status), and watch-driven
//!   wakeup for blocked task waiters
//!
//! One coordinator instance owns exactly one store session. Cross-process
//! mutual exclusion lives in the backing services: the tree's atomic
//! create-if-absent arbitrates task leases, and the injected
//! [`alder_cache::LockProvider`] serializes administrative races. Session
//! loss releases every ephemeral node the instance created - worker identity
//! and task leases alike - which is the sole mechanism for reclaiming the
//! leases of crashed workers.

mod coordinator;
mod error;
mod paths;

pub use coordinator::JobCoordinator;
pub use coordinator::TakenTask;
pub use coordinator::TaskStatus;
pub use error::JobError;
pub use paths::DEFAULT_ROOT;
pub use paths::TreeNamespace;
pub use paths::leaf_name;
