//! Error types for the backing-service traits.

use snafu::Snafu;

/// Errors surfaced by a [`crate::TreeStore`] session.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum TreeStoreError {
    /// The node (or a required parent) does not exist.
    #[snafu(display("no node at '{path}'"))]
    NoNode {
        /// Path that was addressed.
        path: String,
    },

    /// A node already exists at the path.
    #[snafu(display("node already exists at '{path}'"))]
    NodeExists {
        /// Path that was addressed.
        path: String,
    },

    /// Delete refused because the node still has children.
    #[snafu(display("node '{path}' is not empty"))]
    NotEmpty {
        /// Path that was addressed.
        path: String,
    },

    /// The session backing this handle has ended; ephemeral nodes it owned
    /// are gone and no further operations will succeed.
    #[snafu(display("store session expired"))]
    SessionExpired,

    /// Connection-level failure talking to the store.
    #[snafu(display("tree store transport failure: {reason}"))]
    Transport {
        /// What went wrong.
        reason: String,
    },
}

/// Errors surfaced by a [`crate::CacheStore`] connection.
///
/// Only `Transport` is retryable; `Protocol` means the reply itself was
/// malformed and repeating the command cannot help.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
#[snafu(context(suffix(CacheCtx)))]
pub enum CacheStoreError {
    /// Connection-level failure (dead socket, connect refused, timeout).
    #[snafu(display("cache transport failure: {reason}"))]
    Transport {
        /// What went wrong.
        reason: String,
    },

    /// The server answered, but not with a reply this command understands.
    #[snafu(display("cache protocol error: {reason}"))]
    Protocol {
        /// What went wrong.
        reason: String,
    },
}
