//! Worker registry: session-bound ephemeral identity.

use alder_cache::LockProvider;
use alder_core::CreateMode;
use alder_core::TreeStore;
use alder_core::TreeStoreError;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::JobCoordinator;
use crate::error::JobError;
use crate::paths::leaf_name;

impl<S: TreeStore + ?Sized, L: LockProvider + ?Sized> JobCoordinator<S, L> {
    /// Register this instance's worker identity.
    ///
    /// One identity per instance, not re-entrant. The node is ephemeral and
    /// sequential: the store names it and removes it when this instance's
    /// session ends. Returns the assigned name.
    pub async fn register_worker(&self) -> Result<String, JobError> {
        let mut state = self.state.lock().await;
        if state.worker.is_some() {
            return Err(JobError::AlreadyExists {
                what: "worker registration".to_string(),
            });
        }

        let assigned = self
            .store
            .create(&self.namespace.worker_stem(), Vec::new(), CreateMode::EPHEMERAL_SEQUENTIAL)
            .await?;
        let name = leaf_name(&assigned)
            .ok_or_else(|| JobError::Unexpected {
                reason: format!("malformed assigned worker path '{assigned}'"),
            })?
            .to_string();

        info!(worker = name, "worker registered");
        state.worker = Some(name.clone());
        Ok(name)
    }

    /// Drop this instance's worker identity.
    ///
    /// A held task lease is released best-effort first. A worker node the
    /// store already removed (session churn) counts as success; local state
    /// is cleared no matter what.
    pub async fn unregister_worker(&self) -> Result<(), JobError> {
        let mut state = self.state.lock().await;
        let Some(worker) = state.worker.take() else {
            return Err(JobError::NotFound {
                what: "worker registration".to_string(),
            });
        };

        if let Some(lease) = state.lease.take() {
            let working = self.namespace.working(&lease.job, &lease.task);
            if let Err(err) = self.store.delete(&working).await {
                debug!(job = lease.job, task = lease.task, error = %err, "lease release on unregister failed");
            }
        }

        match self.store.delete(&self.namespace.worker(&worker)).await {
            Ok(()) | Err(TreeStoreError::NoNode { .. }) => {}
            Err(err) => warn!(worker, error = %err, "worker node delete failed"),
        }
        info!(worker, "worker unregistered");
        Ok(())
    }

    /// The registered worker name, if any.
    pub async fn worker_name(&self) -> Option<String> {
        self.state.lock().await.worker.clone()
    }

    /// Number of workers currently registered in the cluster.
    ///
    /// Installs a watch on the worker list; the count is eventually
    /// consistent with the store.
    pub async fn worker_count(&self) -> Result<usize, JobError> {
        match self.store.get_children(&self.namespace.worker_root(), true).await {
            Ok(children) => Ok(children.len()),
            Err(TreeStoreError::NoNode { .. }) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }
}
