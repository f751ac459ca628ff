//! Produce-right coordination: at most one producer per cached value.
//!
//! When many workers want the same expensive value, the first to win the
//! produce-right computes and stores it; everyone else waits for the value
//! to appear instead of duplicating the work. There is no release call: the
//! right is a lease and simply lapses, so a crashed producer delays the
//! value by at most one lease period.

use std::time::Duration;

use alder_core::CacheConnector;
use serde::Deserialize;
use serde::Serialize;
use tokio::time::Instant;
use tokio::time::sleep;
use tracing::debug;

use crate::client::CacheClient;
use crate::client::require_ids;
use crate::error::CacheError;
use crate::keys;
use crate::lock::LOCK_POLL_INTERVAL;

/// Outcome of a produce-right attempt. All three are normal results the
/// caller branches on, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProduceRight {
    /// This caller owns the right: compute the value and `set` it before the
    /// lease lapses.
    Granted,
    /// The value is already stored: read it instead of producing.
    AlreadyProduced,
    /// Another caller is producing: wait for the value.
    Busy,
}

impl<C: CacheConnector> CacheClient<C> {
    /// Try to win the exclusive right to produce `(owner, item)`.
    ///
    /// The lock lives under the reserved produce-right namespace, armed with
    /// `lease` and attempted exactly once (no polling): contention means
    /// somebody else is already producing.
    pub async fn try_get_produce_right(
        &self,
        owner: &str,
        item: &str,
        lease: Duration,
    ) -> Result<ProduceRight, CacheError> {
        require_ids(owner, item)?;
        if lease.as_secs() == 0 {
            return Err(CacheError::InvalidArgument {
                reason: "produce-right lease must be at least one second".to_string(),
            });
        }

        if self.exists(owner, item).await? {
            return Ok(ProduceRight::AlreadyProduced);
        }

        let combined = keys::compound(owner, item);
        match self
            .try_lock(keys::PRODUCE_RIGHT_OWNER, &combined, Some(lease), Some(Duration::ZERO))
            .await
        {
            Ok(()) => {
                debug!(owner, item, lease_secs = lease.as_secs(), "produce right granted");
                Ok(ProduceRight::Granted)
            }
            Err(CacheError::TimedOut { .. }) => Ok(ProduceRight::Busy),
            Err(err) => Err(err),
        }
    }

    /// Wait until `(owner, item)` is set.
    ///
    /// Polls every [`LOCK_POLL_INTERVAL`]; independent cache connections
    /// share no notification channel, so polling is the protocol here.
    /// `timeout` of zero makes one non-blocking probe; `None` waits without
    /// bound.
    pub async fn wait_for_item_value(
        &self,
        owner: &str,
        item: &str,
        timeout: Option<Duration>,
    ) -> Result<(), CacheError> {
        require_ids(owner, item)?;
        let started = Instant::now();
        loop {
            if self.exists(owner, item).await? {
                return Ok(());
            }
            if let Some(budget) = timeout
                && started.elapsed() >= budget
            {
                return Err(CacheError::TimedOut {
                    operation: "wait_for_item_value",
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(LOCK_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alder_testing::DeterministicCacheConnector;
    use alder_testing::DeterministicCacheServer;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);
    const LEASE: Duration = Duration::from_secs(2);

    async fn client_over(server: &Arc<DeterministicCacheServer>) -> CacheClient<DeterministicCacheConnector> {
        CacheClient::connect(DeterministicCacheConnector::new(Arc::clone(server)), TIMEOUT)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn zero_lease_is_rejected() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        let err = client.try_get_produce_right("job", "v", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn produced_value_reports_already_produced() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        client.set("job", "v", b"done", None).await.unwrap();
        let right = client.try_get_produce_right("job", "v", LEASE).await.unwrap();
        assert_eq!(right, ProduceRight::AlreadyProduced);
    }

    #[tokio::test]
    async fn second_producer_sees_busy_until_lease_lapses() {
        let server = DeterministicCacheServer::new();
        let producer = client_over(&server).await;
        let rival = client_over(&server).await;

        assert_eq!(
            producer.try_get_produce_right("job", "v", LEASE).await.unwrap(),
            ProduceRight::Granted
        );
        assert_eq!(rival.try_get_produce_right("job", "v", LEASE).await.unwrap(), ProduceRight::Busy);
    }

    #[tokio::test(start_paused = true)]
    async fn lapsed_lease_grants_again_when_nothing_was_written() {
        let server = DeterministicCacheServer::new();
        let producer = client_over(&server).await;
        let rival = client_over(&server).await;

        assert_eq!(
            producer.try_get_produce_right("job", "v", Duration::from_secs(1)).await.unwrap(),
            ProduceRight::Granted
        );

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(rival.try_get_produce_right("job", "v", LEASE).await.unwrap(), ProduceRight::Granted);
    }

    #[tokio::test]
    async fn wait_sees_value_written_by_producer() {
        let server = DeterministicCacheServer::new();
        let producer = Arc::new(client_over(&server).await);
        let waiter = client_over(&server).await;

        let writer = Arc::clone(&producer);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.set("job", "v", b"ready", None).await.unwrap();
        });

        waiter
            .wait_for_item_value("job", "v", Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(waiter.get("job", "v").await.unwrap(), b"ready");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn wait_times_out_when_nothing_appears() {
        let server = DeterministicCacheServer::new();
        let client = client_over(&server).await;

        let err = client
            .wait_for_item_value("job", "v", Some(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::TimedOut { .. }));
    }
}
