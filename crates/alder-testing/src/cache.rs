//! A deterministic in-memory cache server for testing.
//!
//! TTLs are measured with `tokio::time::Instant`, so tests running under a
//! paused clock can advance expiry instantly. Transport faults are injected
//! by counter: the next N commands (or connection attempts) fail with a
//! `Transport` error, which is exactly the class the client layer retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use alder_core::CacheConnector;
use alder_core::CacheStore;
use alder_core::CacheStoreError;
use alder_core::KeyTtl;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A deterministic in-memory cache server.
pub struct DeterministicCacheServer {
    state: Mutex<HashMap<String, Entry>>,
    fail_commands: AtomicUsize,
}

impl DeterministicCacheServer {
    /// Create an empty server wrapped in `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HashMap::new()),
            fail_commands: AtomicUsize::new(0),
        })
    }

    /// Make the next `count` commands fail with a transport error.
    pub fn fail_commands(&self, count: usize) {
        self.fail_commands.store(count, Ordering::SeqCst);
    }

    /// Insert a raw key directly, bypassing the command surface. For
    /// arranging states a well-behaved client would not produce (for
    /// example a lock key whose holder crashed before arming a lease).
    pub async fn plant(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        let mut state = self.state.lock().await;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        state.insert(key.to_string(), Entry { value, expires_at });
    }

    fn take_fault(&self) -> Result<(), CacheStoreError> {
        let mut remaining = self.fail_commands.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.fail_commands.compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => {
                    return Err(CacheStoreError::Transport {
                        reason: "injected fault".to_string(),
                    });
                }
                Err(actual) => remaining = actual,
            }
        }
        Ok(())
    }

    /// Remove the entry if its TTL has lapsed; report whether a live entry
    /// remains.
    fn purge_expired(state: &mut HashMap<String, Entry>, key: &str, now: Instant) -> bool {
        match state.get(key) {
            Some(entry) if entry.is_expired(now) => {
                state.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

/// One "connection" to a [`DeterministicCacheServer`].
pub struct DeterministicCacheConn {
    server: Arc<DeterministicCacheServer>,
}

#[async_trait]
impl CacheStore for DeterministicCacheConn {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheStoreError> {
        self.server.take_fault()?;
        let mut state = self.server.state.lock().await;
        if !DeterministicCacheServer::purge_expired(&mut state, key, Instant::now()) {
            return Ok(None);
        }
        Ok(state.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CacheStoreError> {
        self.server.take_fault()?;
        let mut state = self.server.state.lock().await;
        state.insert(key.to_string(), Entry { value, expires_at: None });
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), CacheStoreError> {
        self.server.take_fault()?;
        let mut state = self.server.state.lock().await;
        state.insert(key.to_string(), Entry {
            value,
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
        });
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>) -> Result<bool, CacheStoreError> {
        self.server.take_fault()?;
        let mut state = self.server.state.lock().await;
        if DeterministicCacheServer::purge_expired(&mut state, key, Instant::now()) {
            return Ok(false);
        }
        state.insert(key.to_string(), Entry { value, expires_at: None });
        Ok(true)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, CacheStoreError> {
        self.server.take_fault()?;
        let mut state = self.server.state.lock().await;
        let now = Instant::now();
        if !DeterministicCacheServer::purge_expired(&mut state, key, now) {
            return Ok(false);
        }
        if let Some(entry) = state.get_mut(key) {
            entry.expires_at = Some(now + Duration::from_secs(ttl_seconds));
        }
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, CacheStoreError> {
        self.server.take_fault()?;
        let mut state = self.server.state.lock().await;
        let now = Instant::now();
        if !DeterministicCacheServer::purge_expired(&mut state, key, now) {
            return Ok(KeyTtl::Missing);
        }
        let ttl = match state.get(key).and_then(|entry| entry.expires_at) {
            None => KeyTtl::NoExpiry,
            Some(at) => KeyTtl::Expires {
                seconds: at.saturating_duration_since(now).as_secs().max(1),
            },
        };
        Ok(ttl)
    }

    async fn del(&self, key: &str) -> Result<bool, CacheStoreError> {
        self.server.take_fault()?;
        let mut state = self.server.state.lock().await;
        let live = DeterministicCacheServer::purge_expired(&mut state, key, Instant::now());
        state.remove(key);
        Ok(live)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheStoreError> {
        self.server.take_fault()?;
        let mut state = self.server.state.lock().await;
        Ok(DeterministicCacheServer::purge_expired(&mut state, key, Instant::now()))
    }
}

/// Connector minting connections to one [`DeterministicCacheServer`].
#[derive(Clone)]
pub struct DeterministicCacheConnector {
    server: Arc<DeterministicCacheServer>,
    fail_connections: Arc<AtomicUsize>,
}

impl DeterministicCacheConnector {
    /// Connector for the given server.
    pub fn new(server: Arc<DeterministicCacheServer>) -> Self {
        Self {
            server,
            fail_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_connections(&self, count: usize) {
        self.fail_connections.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheConnector for DeterministicCacheConnector {
    type Conn = DeterministicCacheConn;

    async fn connect(&self, _timeout: Duration) -> Result<Self::Conn, CacheStoreError> {
        let mut remaining = self.fail_connections.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.fail_connections.compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => {
                    return Err(CacheStoreError::Transport {
                        reason: "injected connect failure".to_string(),
                    });
                }
                Err(actual) => remaining = actual,
            }
        }
        Ok(DeterministicCacheConn {
            server: Arc::clone(&self.server),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn conn(server: &Arc<DeterministicCacheServer>) -> DeterministicCacheConn {
        DeterministicCacheConnector::new(Arc::clone(server))
            .connect(Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn set_nx_is_first_writer_wins() {
        let server = DeterministicCacheServer::new();
        let c = conn(&server).await;

        assert!(c.set_nx("k", b"a".to_vec()).await.unwrap());
        assert!(!c.set_nx("k", b"b".to_vec()).await.unwrap());
        assert_eq!(c.get("k").await.unwrap().unwrap(), b"a");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_behave_as_missing() {
        let server = DeterministicCacheServer::new();
        let c = conn(&server).await;

        c.set_ex("k", b"v".to_vec(), 1).await.unwrap();
        assert!(c.exists("k").await.unwrap());
        assert!(matches!(c.ttl("k").await.unwrap(), KeyTtl::Expires { .. }));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!c.exists("k").await.unwrap());
        assert_eq!(c.ttl("k").await.unwrap(), KeyTtl::Missing);
        assert!(c.set_nx("k", b"new".to_vec()).await.unwrap());
    }

    #[tokio::test]
    async fn injected_faults_hit_the_next_commands_only() {
        let server = DeterministicCacheServer::new();
        let c = conn(&server).await;

        server.fail_commands(1);
        assert!(c.exists("k").await.is_err());
        assert!(c.exists("k").await.is_ok());
    }
}
