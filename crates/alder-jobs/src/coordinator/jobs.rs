//! Job lifecycle: reference-counted create and terminate.
//!
//! Several independent owners may create the same job; each create adds one
//! reference node, each terminate removes one, and the job's durable state
//! survives exactly as long as references remain. Both operations serialize
//! through the injected lock provider so racing owners cannot interleave
//! their counter and subtree updates.

use std::time::Duration;

use alder_cache::CacheError;
use alder_cache::LockProvider;
use alder_core::CreateMode;
use alder_core::TreeStore;
use alder_core::TreeStoreError;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::JobCoordinator;
use super::require_job;
use crate::error::JobError;

/// Item name the per-job administrative lock is taken under.
const JOB_LOCK_ITEM: &str = "lock";
/// Lease on the administrative lock; generous because teardown walks trees.
const JOB_LOCK_LEASE: Duration = Duration::from_secs(120);
/// How long create/terminate will wait for the administrative lock.
const JOB_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

impl<S: TreeStore + ?Sized, L: LockProvider + ?Sized> JobCoordinator<S, L> {
    /// Create the job, or add a reference to it if it already exists.
    ///
    /// Returns `true` when this call stored the configuration (first owner).
    /// Later callers only add a reference; their `config` is discarded - the
    /// first caller's blob wins, which is the idempotence policy here.
    pub async fn create_job(&self, job: &str, config: &[u8]) -> Result<bool, JobError> {
        require_job(job)?;
        self.lock_job(job, "create_job").await?;
        let result = self.create_job_locked(job, config).await;
        self.unlock_job(job).await;
        result
    }

    /// Drop one reference to the job; purge its durable state when this was
    /// the last one.
    pub async fn terminate_job(&self, job: &str) -> Result<(), JobError> {
        require_job(job)?;
        self.lock_job(job, "terminate_job").await?;
        let result = self.terminate_job_locked(job).await;
        self.unlock_job(job).await;
        result
    }

    /// Read the job's configuration blob.
    pub async fn get_job_config(&self, job: &str) -> Result<Vec<u8>, JobError> {
        require_job(job)?;
        match self.store.get_data(&self.namespace.job_config(job)).await {
            Ok(config) => Ok(config),
            Err(TreeStoreError::NoNode { .. }) => Err(JobError::NotFound {
                what: format!("job '{job}'"),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_job_locked(&self, job: &str, config: &[u8]) -> Result<bool, JobError> {
        // One reference per create call, unconditionally.
        self.ensure_chain(&self.namespace.job_counter_root(job)).await?;
        self.store
            .create(&self.namespace.counter_stem(job), Vec::new(), CreateMode::PERSISTENT_SEQUENTIAL)
            .await?;

        self.ensure_chain(&self.namespace.job_config_root()).await?;
        let config_path = self.namespace.job_config(job);
        let stored_config = match self.store.create(&config_path, config.to_vec(), CreateMode::PERSISTENT).await {
            Ok(_) => true,
            Err(TreeStoreError::NodeExists { .. }) => false,
            Err(err) => return Err(err.into()),
        };

        self.ensure_chain(&self.namespace.ordering_root(job)).await?;
        self.ensure_chain(&self.namespace.working_root(job)).await?;
        self.ensure_chain(&self.namespace.result_root(job)).await?;

        info!(job, stored_config, "job reference added");
        Ok(stored_config)
    }

    async fn terminate_job_locked(&self, job: &str) -> Result<(), JobError> {
        let counter_root = self.namespace.job_counter_root(job);
        let mut refs = match self.store.get_children(&counter_root, false).await {
            Ok(children) => children,
            Err(TreeStoreError::NoNode { .. }) => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        refs.sort();

        if let Some(oldest) = refs.first() {
            let path = self.namespace.job_counter(job, oldest);
            match self.store.delete(&path).await {
                Ok(()) | Err(TreeStoreError::NoNode { .. }) => {}
                Err(err) => warn!(job, path, error = %err, "reference delete failed"),
            }
        }

        if refs.len() > 1 {
            debug!(job, remaining = refs.len() - 1, "job still referenced, keeping state");
            return Ok(());
        }

        // Last reference gone: everything durable goes with it.
        self.purge_tree(&self.namespace.job_config(job)).await?;
        self.purge_tree(&self.namespace.ordering_root(job)).await?;
        self.purge_tree(&self.namespace.working_root(job)).await?;
        self.purge_tree(&self.namespace.result_root(job)).await?;
        self.purge_tree(&counter_root).await?;
        info!(job, "job terminated");
        Ok(())
    }

    async fn lock_job(&self, job: &str, operation: &'static str) -> Result<(), JobError> {
        self.locks
            .try_lock(job, JOB_LOCK_ITEM, Some(JOB_LOCK_LEASE), Some(JOB_LOCK_TIMEOUT))
            .await
            .map_err(|err| match err {
                CacheError::TimedOut { .. } => JobError::TimedOut { operation },
                source => JobError::Lock { source },
            })
    }

    async fn unlock_job(&self, job: &str) {
        if let Err(err) = self.locks.unlock(job, JOB_LOCK_ITEM).await {
            warn!(job, error = %err, "administrative unlock failed; lease will lapse on its own");
        }
    }
}
