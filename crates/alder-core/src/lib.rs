//! Capability traits for the two backing services the alder coordination
//! layer is built on:
//!
//! - [`TreeStore`] - a session against a hierarchical coordination store with
//!   atomic create-if-absent, ephemeral/sequential node flags, and one-shot
//!   change watches.
//! - [`CacheStore`] / [`CacheConnector`] - a connection to a key-value cache
//!   server with TTL expiry and an atomic set-if-absent primitive.
//!
//! Higher layers (`alder-cache`, `alder-jobs`) are generic over these traits;
//! `alder-testing` provides deterministic in-memory implementations.

mod cache;
mod error;
mod tree;

pub use cache::CacheConnector;
pub use cache::CacheStore;
pub use cache::KeyTtl;
pub use error::CacheStoreError;
pub use error::TreeStoreError;
pub use tree::CreateMode;
pub use tree::TreeEvent;
pub use tree::TreeStore;
