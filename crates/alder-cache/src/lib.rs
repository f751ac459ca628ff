//! Cache client and cache-backed coordination primitives.
//!
//! This crate provides:
//!
//! - [`CacheClient`] - typed get/set/remove/exists over one cache-server
//!   connection, with a bounded reconnect-and-retry on transport failure
//! - `try_lock`/`unlock` - a polling distributed mutual-exclusion lock built
//!   on the server's atomic set-if-absent
//! - [`ProduceRight`] - the anti-stampede protocol for expensive cached
//!   values: at most one producer per key per lease
//! - [`LockProvider`] - the lock seam other components take as an injected
//!   dependency
//!
//! All mutual exclusion here is advisory: it holds between cooperating
//! callers only, and its authority lives in the cache server's atomic
//! primitives, never in this process.

mod client;
mod error;
pub mod keys;
mod lock;
mod produce;

pub use client::CacheClient;
pub use error::CacheError;
pub use lock::LOCK_POLL_INTERVAL;
pub use lock::LockProvider;
pub use produce::ProduceRight;
