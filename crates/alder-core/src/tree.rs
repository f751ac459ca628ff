//! The hierarchical coordination-store session trait.
//!
//! A [`TreeStore`] value represents one live session. Ephemeral nodes created
//! through it are removed by the store when the session ends, and change
//! watches armed through it are delivered on the session's event channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::TreeStoreError;

/// Node creation flags.
///
/// Sequential creation appends a ten-digit, zero-padded counter (scoped per
/// parent) to the requested name; the assigned full path is returned from
/// [`TreeStore::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateMode {
    /// Node lifetime is bound to the creating session.
    pub ephemeral: bool,
    /// Leaf name is completed by the store's per-parent counter.
    pub sequential: bool,
}

impl CreateMode {
    /// Plain durable node.
    pub const PERSISTENT: Self = Self {
        ephemeral: false,
        sequential: false,
    };
    /// Durable node with a store-assigned sequence suffix.
    pub const PERSISTENT_SEQUENTIAL: Self = Self {
        ephemeral: false,
        sequential: true,
    };
    /// Session-bound node.
    pub const EPHEMERAL: Self = Self {
        ephemeral: true,
        sequential: false,
    };
    /// Session-bound node with a store-assigned sequence suffix.
    pub const EPHEMERAL_SEQUENTIAL: Self = Self {
        ephemeral: true,
        sequential: true,
    };
}

/// Event delivered on a session's channel.
///
/// `Changed` is a level-triggered hint: it says something under `path`
/// mutated since the watch was armed, not what, and watches are one-shot
/// until re-armed by the next listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// Children of `path` changed while a watch was armed on it.
    Changed {
        /// The watched parent path.
        path: String,
    },
    /// The session ended; no further events will arrive.
    SessionClosed,
}

/// One session against the hierarchical coordination store.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Create a node, returning the assigned path (differs from `path` only
    /// for sequential modes). Fails `NodeExists` for a present non-sequential
    /// path and `NoNode` when the parent is missing.
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String, TreeStoreError>;

    /// Delete a leaf node. Fails `NoNode` when absent and `NotEmpty` when the
    /// node still has children.
    async fn delete(&self, path: &str) -> Result<(), TreeStoreError>;

    /// Whether a node exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool, TreeStoreError>;

    /// List child leaf names. With `watch`, arms a one-shot watch on `path`
    /// for this session; the watch is re-armed per call, never persistently.
    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, TreeStoreError>;

    /// Read a node's payload. Fails `NoNode` when absent.
    async fn get_data(&self, path: &str) -> Result<Vec<u8>, TreeStoreError>;

    /// Subscribe to this session's event channel (watch fires and session
    /// close). Each call returns an independent receiver.
    fn subscribe(&self) -> broadcast::Receiver<TreeEvent>;
}

#[async_trait]
impl<T: TreeStore + ?Sized> TreeStore for Arc<T> {
    async fn create(&self, path: &str, data: Vec<u8>, mode: CreateMode) -> Result<String, TreeStoreError> {
        (**self).create(path, data, mode).await
    }

    async fn delete(&self, path: &str) -> Result<(), TreeStoreError> {
        (**self).delete(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool, TreeStoreError> {
        (**self).exists(path).await
    }

    async fn get_children(&self, path: &str, watch: bool) -> Result<Vec<String>, TreeStoreError> {
        (**self).get_children(path, watch).await
    }

    async fn get_data(&self, path: &str) -> Result<Vec<u8>, TreeStoreError> {
        (**self).get_data(path).await
    }

    fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        (**self).subscribe()
    }
}
