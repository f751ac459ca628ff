//! The cache-server connection traits.
//!
//! [`CacheStore`] is one live connection speaking the cache server's command
//! surface. [`CacheConnector`] is the capability to establish such
//! connections; the client layer owns exactly one connection at a time and
//! uses the connector to replace it after a transport failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::error::CacheStoreError;

/// A key's TTL state as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists and never expires.
    NoExpiry,
    /// The key exists and expires after this many seconds.
    Expires {
        /// Remaining lifetime in whole seconds.
        seconds: u64,
    },
}

/// One live connection to the cache server.
///
/// Implementations report dead-connection conditions as
/// [`CacheStoreError::Transport`]; that is the only class the client layer
/// will reconnect-and-retry on.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value. `None` means the key is not set (a logical outcome, not
    /// an error).
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError>;

    /// Set a value with no expiry.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheStoreError>;

    /// Set a value that expires after `ttl_seconds`.
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheStoreError>;

    /// Atomic set-if-absent. Returns `true` when this call created the key.
    async fn set_nx(&self, key: &str, value: Vec<u8>) -> Result<bool, CacheStoreError>;

    /// (Re)set a key's expiry. Returns `false` when the key is missing.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, CacheStoreError>;

    /// Report a key's TTL state.
    async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheStoreError>;

    /// Delete a key. Returns `false` when it was already absent.
    async fn del(&self, key: &str) -> Result<bool, CacheStoreError>;

    /// Whether a key is set.
    async fn exists(&self, key: &str) -> Result<bool, CacheStoreError>;
}

/// Capability to establish cache-server connections.
#[async_trait]
pub trait CacheConnector: Send + Sync {
    /// The connection type produced.
    type Conn: CacheStore;

    /// Open a new connection, bounded by `timeout`.
    async fn connect(&self, timeout: Duration) -> Result<Self::Conn, CacheStoreError>;
}

#[async_trait]
impl<T: CacheConnector> CacheConnector for Arc<T> {
    type Conn = T::Conn;

    async fn connect(&self, timeout: Duration) -> Result<Self::Conn, CacheStoreError> {
        (**self).connect(timeout).await
    }
}
