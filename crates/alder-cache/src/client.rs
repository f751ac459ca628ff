//! The cache client: one connection, serialized operations, bounded retry.

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use alder_core::CacheConnector;
use alder_core::CacheStore;
use alder_core::CacheStoreError;
use alder_core::KeyTtl;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use crate::error::CacheError;
use crate::keys;

/// Transport failures get exactly this many reconnect-and-retry rounds.
const RETRY_LIMIT: u32 = 1;

/// A command against the cache server, routed through one dispatch path so
/// the retry protocol is applied uniformly.
pub(crate) enum Command<'a> {
    Get { key: &'a str },
    Set { key: &'a str, value: &'a [u8], ttl: Option<Duration> },
    SetNx { key: &'a str, value: &'a [u8] },
    Expire { key: &'a str, ttl: Duration },
    Ttl { key: &'a str },
    Del { key: &'a str },
    Exists { key: &'a str },
}

impl Command<'_> {
    fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { ttl: None, .. } => "SET",
            Command::Set { ttl: Some(_), .. } => "SETEX",
            Command::SetNx { .. } => "SETNX",
            Command::Expire { .. } => "EXPIRE",
            Command::Ttl { .. } => "TTL",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
        }
    }
}

pub(crate) enum Reply {
    Value(Option<Vec<u8>>),
    Flag(bool),
    Ttl(KeyTtl),
    Unit,
}

/// Typed client over one cache-server connection.
///
/// All operations on one instance are serialized by the internal connection
/// lock: one call completes before the next begins. Cross-process exclusion
/// comes from the server's atomic primitives, not from this lock.
pub struct CacheClient<C: CacheConnector> {
    connector: C,
    connect_timeout: Duration,
    conn: Mutex<Option<C::Conn>>,
    /// Process-local "known present" hint set; never authoritative.
    local_avail: StdMutex<HashSet<String>>,
}

impl<C: CacheConnector> CacheClient<C> {
    /// Connect eagerly and return a ready client.
    pub async fn connect(connector: C, connect_timeout: Duration) -> Result<Self, CacheError> {
        if connect_timeout.is_zero() {
            return Err(CacheError::InvalidArgument {
                reason: "connect timeout must be positive".to_string(),
            });
        }
        let conn = connector
            .connect(connect_timeout)
            .await
            .map_err(|source| CacheError::CommunicationFailure {
                reason: source.to_string(),
            })?;
        Ok(Self {
            connector,
            connect_timeout,
            conn: Mutex::new(Some(conn)),
            local_avail: StdMutex::new(HashSet::new()),
        })
    }

    /// Read an item's value.
    pub async fn get(&self, owner: &str, item: &str) -> Result<Vec<u8>, CacheError> {
        require_ids(owner, item)?;
        let key = keys::compound(owner, item);
        match self.dispatch(Command::Get { key: &key }).await? {
            Reply::Value(Some(value)) => Ok(value),
            Reply::Value(None) => Err(CacheError::NotFound { key }),
            _ => Err(reply_mismatch("GET")),
        }
    }

    /// Set an item's value, optionally expiring after `ttl`.
    pub async fn set(&self, owner: &str, item: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        require_ids(owner, item)?;
        if ttl.is_some_and(|ttl| ttl.as_secs() == 0) {
            return Err(CacheError::InvalidArgument {
                reason: "ttl must be at least one second".to_string(),
            });
        }
        let key = keys::compound(owner, item);
        debug!(key, ttl_secs = ttl.map(|t| t.as_secs()), "set cache item");
        match self.dispatch(Command::Set { key: &key, value, ttl }).await? {
            Reply::Unit => Ok(()),
            _ => Err(reply_mismatch("SET")),
        }
    }

    /// Remove an item. `NotFound` when it was not set.
    pub async fn remove(&self, owner: &str, item: &str) -> Result<(), CacheError> {
        require_ids(owner, item)?;
        let key = keys::compound(owner, item);
        match self.dispatch(Command::Del { key: &key }).await? {
            Reply::Flag(true) => Ok(()),
            Reply::Flag(false) => Err(CacheError::NotFound { key }),
            _ => Err(reply_mismatch("DEL")),
        }
    }

    /// Whether an item is set.
    pub async fn exists(&self, owner: &str, item: &str) -> Result<bool, CacheError> {
        require_ids(owner, item)?;
        let key = keys::compound(owner, item);
        match self.dispatch(Command::Exists { key: &key }).await? {
            Reply::Flag(present) => Ok(present),
            _ => Err(reply_mismatch("EXISTS")),
        }
    }

    /// Whether this process has previously marked the item present.
    ///
    /// An optimization hint only: a `true` may be stale, a `false` says
    /// nothing. Nothing invalidates entries except an explicit
    /// [`reset_local_cache_avail`](Self::reset_local_cache_avail).
    pub fn is_local_cache_avail(&self, owner: &str, item: &str) -> bool {
        let avail = self.local_avail.lock().unwrap_or_else(|e| e.into_inner());
        avail.contains(&keys::compound(owner, item))
    }

    /// Mark the item present in the process-local hint set.
    pub fn set_local_cache_avail(&self, owner: &str, item: &str) {
        let mut avail = self.local_avail.lock().unwrap_or_else(|e| e.into_inner());
        avail.insert(keys::compound(owner, item));
    }

    /// Clear the process-local hint set.
    pub fn reset_local_cache_avail(&self) {
        let mut avail = self.local_avail.lock().unwrap_or_else(|e| e.into_inner());
        avail.clear();
    }

    /// Run one command, reconnecting once and retrying once on transport
    /// failure. Logical outcomes pass through untouched.
    pub(crate) async fn dispatch(&self, command: Command<'_>) -> Result<Reply, CacheError> {
        let mut conn = self.conn.lock().await;
        for attempt in 0..=RETRY_LIMIT {
            if conn.is_none() {
                let fresh = self.connector.connect(self.connect_timeout).await.map_err(|source| {
                    CacheError::CommunicationFailure {
                        reason: format!("reconnect failed: {source}"),
                    }
                })?;
                *conn = Some(fresh);
            }
            let live = conn.as_ref().ok_or_else(|| CacheError::Unexpected {
                reason: "connection missing after connect".to_string(),
            })?;
            match run(live, &command).await {
                Ok(reply) => return Ok(reply),
                Err(CacheStoreError::Transport { reason }) => {
                    warn!(command = command.name(), attempt, reason, "cache transport failure");
                    *conn = None;
                    if attempt == RETRY_LIMIT {
                        return Err(CacheError::CommunicationFailure { reason });
                    }
                }
                Err(source) => return Err(CacheError::Store { source }),
            }
        }
        Err(CacheError::CommunicationFailure {
            reason: "retry budget exhausted".to_string(),
        })
    }
}

async fn run<S: CacheStore>(conn: &S, command: &Command<'_>) -> Result<Reply, CacheStoreError> {
    match command {
        Command::Get { key } => Ok(Reply::Value(conn.get(key).await?)),
        Command::Set { key, value, ttl: None } => {
            conn.set(key, value.to_vec()).await?;
            Ok(Reply::Unit)
        }
        Command::Set { key, value, ttl: Some(ttl) } => {
            conn.set_ex(key, value.to_vec(), ttl.as_secs()).await?;
            Ok(Reply::Unit)
        }
        Command::SetNx { key, value } => Ok(Reply::Flag(conn.set_nx(key, value.to_vec()).await?)),
        Command::Expire { key, ttl } => Ok(Reply::Flag(conn.expire(key, ttl.as_secs()).await?)),
        Command::Ttl { key } => Ok(Reply::Ttl(conn.ttl(key).await?)),
        Command::Del { key } => Ok(Reply::Flag(conn.del(key).await?)),
        Command::Exists { key } => Ok(Reply::Flag(conn.exists(key).await?)),
    }
}

pub(crate) fn require_ids(owner: &str, item: &str) -> Result<(), CacheError> {
    if owner.is_empty() || item.is_empty() {
        return Err(CacheError::InvalidArgument {
            reason: "owner and item must be non-empty".to_string(),
        });
    }
    Ok(())
}

fn reply_mismatch(command: &str) -> CacheError {
    CacheError::Unexpected {
        reason: format!("reply shape did not match {command}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use alder_testing::DeterministicCacheConnector;
    use alder_testing::DeterministicCacheServer;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    async fn client_over(server: &Arc<DeterministicCacheServer>) -> CacheClient<DeterministicCacheConnector> {
        CacheClient::connect(DeterministicCacheConnector::new(Arc::clone(server)), TIMEOUT)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        client.set("job", "report", b"payload", None).await.unwrap();
        assert_eq!(client.get("job", "report").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn get_unset_is_not_found() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        let err = client.get("job", "missing").await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[tokio::test]
    async fn remove_is_not_found_when_absent() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        client.set("job", "x", b"1", None).await.unwrap();
        client.remove("job", "x").await.unwrap();
        let err = client.remove("job", "x").await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[tokio::test]
    async fn empty_identifiers_are_rejected() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        let err = client.get("", "item").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
        let err = client.exists("owner", "").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn one_transport_fault_is_absorbed() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;
        client.set("job", "v", b"1", None).await.unwrap();

        server.fail_commands(1);
        assert_eq!(client.get("job", "v").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn second_transport_fault_is_terminal() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        server.fail_commands(2);
        let err = client.exists("job", "v").await.unwrap_err();
        assert!(matches!(err, CacheError::CommunicationFailure { .. }));

        // The next call reconnects and proceeds normally.
        assert!(!client.exists("job", "v").await.unwrap());
    }

    #[tokio::test]
    async fn failed_reconnect_is_terminal() {
        let server = DeterministicCacheServer::new();
        let connector = DeterministicCacheConnector::new(Arc::clone(&server));
        let client = CacheClient::connect(connector.clone(), TIMEOUT).await.unwrap();

        server.fail_commands(1);
        connector.fail_connections(1);
        let err = client.exists("job", "v").await.unwrap_err();
        assert!(matches!(err, CacheError::CommunicationFailure { .. }));
    }

    #[tokio::test]
    async fn local_avail_is_memoized_until_reset() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        assert!(!client.is_local_cache_avail("job", "x"));
        client.set_local_cache_avail("job", "x");
        assert!(client.is_local_cache_avail("job", "x"));
        // No automatic invalidation, even though nothing was ever stored.
        assert!(client.is_local_cache_avail("job", "x"));
        client.reset_local_cache_avail();
        assert!(!client.is_local_cache_avail("job", "x"));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry_removes_value() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        client.set("job", "short", b"1", Some(Duration::from_secs(1))).await.unwrap();
        assert!(client.exists("job", "short").await.unwrap());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!client.exists("job", "short").await.unwrap());
    }
}
