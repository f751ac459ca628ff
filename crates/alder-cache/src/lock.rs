//! Polling distributed lock on the cache server's set-if-absent primitive.

use std::sync::Arc;
use std::time::Duration;

use alder_core::CacheConnector;
use alder_core::KeyTtl;
use async_trait::async_trait;
use tokio::time::Instant;
use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use crate::client::CacheClient;
use crate::client::Command;
use crate::client::Reply;
use crate::client::require_ids;
use crate::error::CacheError;
use crate::keys;

/// Interval between acquisition attempts while a lock is busy.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// The lock seam consumed by components that need mutual exclusion but must
/// not know where it comes from.
///
/// Semantics match [`CacheClient::try_lock`] / [`CacheClient::unlock`]:
/// advisory locks, cooperating callers only.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Acquire the lock on `(owner, item)` within `timeout`.
    ///
    /// `timeout` of zero makes a single non-blocking attempt; `None` waits
    /// without bound. `lease` of `None` leaves the lock without expiry (the
    /// holder must unlock).
    async fn try_lock(
        &self,
        owner: &str,
        item: &str,
        lease: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Release the lock. `Ok(false)` when no lock entry existed (idempotent).
    async fn unlock(&self, owner: &str, item: &str) -> Result<bool, CacheError>;
}

impl<C: CacheConnector> CacheClient<C> {
    /// Acquire the distributed lock on `(owner, item)`.
    ///
    /// Polls every [`LOCK_POLL_INTERVAL`] until acquired or the budget runs
    /// out (`TimedOut`). A lock key found without an expiry belongs to a
    /// holder that crashed between creating it and arming its lease; the
    /// attempt re-arms the lease so the key cannot stay stuck forever.
    pub async fn try_lock(
        &self,
        owner: &str,
        item: &str,
        lease: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<(), CacheError> {
        require_ids(owner, item)?;
        let lock_key = keys::lock(owner, item);
        let token = rand::random::<u64>().to_string();
        let started = Instant::now();

        loop {
            if self.lock_attempt(&lock_key, token.as_bytes(), lease).await? {
                debug!(lock_key, "lock acquired");
                return Ok(());
            }
            if let Some(budget) = timeout
                && started.elapsed() >= budget
            {
                return Err(CacheError::TimedOut {
                    operation: "try_lock",
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    /// Release the lock on `(owner, item)` unconditionally.
    ///
    /// Returns `Ok(false)` when the lock entry was already absent; releasing
    /// an expired or never-held lock is not an error.
    pub async fn unlock(&self, owner: &str, item: &str) -> Result<bool, CacheError> {
        require_ids(owner, item)?;
        let lock_key = keys::lock(owner, item);
        match self.dispatch(Command::Del { key: &lock_key }).await? {
            Reply::Flag(removed) => {
                debug!(lock_key, removed, "lock released");
                Ok(removed)
            }
            _ => Err(CacheError::Unexpected {
                reason: "reply shape did not match DEL".to_string(),
            }),
        }
    }

    /// One acquisition attempt. `Ok(true)` means the lock is held.
    async fn lock_attempt(&self, lock_key: &str, token: &[u8], lease: Option<Duration>) -> Result<bool, CacheError> {
        let created = match self.dispatch(Command::SetNx { key: lock_key, value: token }).await? {
            Reply::Flag(created) => created,
            _ => {
                return Err(CacheError::Unexpected {
                    reason: "reply shape did not match SETNX".to_string(),
                });
            }
        };

        if created {
            if let Some(lease) = lease
                && lease.as_secs() > 0
            {
                self.dispatch(Command::Expire { key: lock_key, ttl: lease }).await?;
            }
            return Ok(true);
        }

        // Somebody holds it. A key with no expiry means its holder crashed
        // before arming the lease; re-arm so the lock can ever be freed.
        if let Reply::Ttl(KeyTtl::NoExpiry) = self.dispatch(Command::Ttl { key: lock_key }).await?
            && let Some(lease) = lease
            && lease.as_secs() > 0
        {
            warn!(lock_key, "lock key without expiry, resetting lease");
            self.dispatch(Command::Expire { key: lock_key, ttl: lease }).await?;
        }
        Ok(false)
    }
}

#[async_trait]
impl<C: CacheConnector> LockProvider for CacheClient<C> {
    async fn try_lock(
        &self,
        owner: &str,
        item: &str,
        lease: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<(), CacheError> {
        CacheClient::try_lock(self, owner, item, lease, timeout).await
    }

    async fn unlock(&self, owner: &str, item: &str) -> Result<bool, CacheError> {
        CacheClient::unlock(self, owner, item).await
    }
}

#[async_trait]
impl<T: LockProvider + ?Sized> LockProvider for Arc<T> {
    async fn try_lock(
        &self,
        owner: &str,
        item: &str,
        lease: Option<Duration>,
        timeout: Option<Duration>,
    ) -> Result<(), CacheError> {
        (**self).try_lock(owner, item, lease, timeout).await
    }

    async fn unlock(&self, owner: &str, item: &str) -> Result<bool, CacheError> {
        (**self).unlock(owner, item).await
    }
}
