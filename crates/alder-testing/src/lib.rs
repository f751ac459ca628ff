//! Deterministic in-memory implementations of the alder backing-service
//! traits, for tests.
//!
//! - [`DeterministicTree`] - a multi-session hierarchical store with
//!   ephemeral/sequential nodes, one-shot watches, and session-expiry
//!   injection.
//! - [`DeterministicCacheServer`] - a TTL-aware key-value server with
//!   transport-fault injection, plus a matching connector.
//!
//! Both are thread-safe and behave predictably; neither touches the network.

mod cache;
mod tree;

pub use cache::DeterministicCacheConn;
pub use cache::DeterministicCacheConnector;
pub use cache::DeterministicCacheServer;
pub use tree::DeterministicTree;
pub use tree::DeterministicTreeSession;
