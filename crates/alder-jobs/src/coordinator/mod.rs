//! The job coordinator: one store session, one optional worker identity.

mod jobs;
mod tasks;
mod wait;
mod workers;

use std::sync::Arc;

use alder_cache::LockProvider;
use alder_core::CreateMode;
use alder_core::TreeStore;
use alder_core::TreeStoreError;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::JobError;
use crate::paths::TreeNamespace;

/// Derived task state (never stored; computed from subtree presence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Ordering entry only: enqueued, nobody working on it.
    Waiting,
    /// Ordering and working entries both present: leased to a worker.
    Running,
    /// No ordering entry: never enqueued, or already finished.
    NotExists,
}

/// A task leased to this instance's worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakenTask {
    /// Job the task belongs to.
    pub job: String,
    /// Store-assigned task name.
    pub task: String,
    /// Opaque payload supplied at enqueue time.
    pub data: Vec<u8>,
}

/// The single lease this instance's worker may hold.
#[derive(Debug, Clone)]
pub(crate) struct ActiveLease {
    pub(crate) job: String,
    pub(crate) task: String,
}

/// Per-instance mutable state: the registered worker identity and its lease.
#[derive(Debug, Default)]
pub(crate) struct WorkerState {
    pub(crate) worker: Option<String>,
    pub(crate) lease: Option<ActiveLease>,
}

/// Coordinates jobs, workers, and tasks over one tree-store session.
///
/// The store session and the lock provider are injected capabilities; this
/// type never reaches into process-wide registries. One instance registers
/// at most one worker, and that worker holds at most one task lease at a
/// time. Everything ephemeral the instance creates (worker node, working
/// entries) disappears with its session, which is how crashed workers'
/// leases are reclaimed.
pub struct JobCoordinator<S: TreeStore + ?Sized, L: LockProvider + ?Sized> {
    pub(crate) store: Arc<S>,
    pub(crate) locks: Arc<L>,
    pub(crate) namespace: TreeNamespace,
    pub(crate) state: Mutex<WorkerState>,
}

impl<S: TreeStore + ?Sized, L: LockProvider + ?Sized> JobCoordinator<S, L> {
    /// Coordinator over `store` with `locks` injected for administrative
    /// serialization.
    pub fn new(store: Arc<S>, locks: Arc<L>, namespace: TreeNamespace) -> Self {
        Self {
            store,
            locks,
            namespace,
            state: Mutex::new(WorkerState::default()),
        }
    }

    /// The namespace this coordinator operates in.
    pub fn namespace(&self) -> &TreeNamespace {
        &self.namespace
    }

    /// Create the fixed root directories (worker list and job-config root).
    /// Idempotent; call once per instance before anything else.
    pub async fn bootstrap(&self) -> Result<(), JobError> {
        self.ensure_chain(&self.namespace.worker_root()).await?;
        self.ensure_chain(&self.namespace.job_config_root()).await?;
        Ok(())
    }

    /// Create every segment of `path` that does not exist yet, top down.
    pub(crate) async fn ensure_chain(&self, path: &str) -> Result<(), JobError> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            match self.store.create(&current, Vec::new(), CreateMode::PERSISTENT).await {
                Ok(_) | Err(TreeStoreError::NodeExists { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Delete the subtree rooted at `root`, children before parents.
    ///
    /// The tree is externally observed and its depth untrusted, so the walk
    /// is an explicit worklist, not call-stack recursion. Nodes that vanish
    /// mid-walk are fine; a delete refused for any other reason is logged
    /// and skipped, matching the best-effort contract of job teardown.
    pub(crate) async fn purge_tree(&self, root: &str) -> Result<(), JobError> {
        let mut stack = vec![root.to_string()];
        let mut discovered: Vec<String> = Vec::new();
        while let Some(path) = stack.pop() {
            match self.store.get_children(&path, false).await {
                Ok(children) => {
                    for child in children {
                        stack.push(format!("{path}/{child}"));
                    }
                    discovered.push(path);
                }
                Err(TreeStoreError::NoNode { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }
        // Every node was discovered before its children, so the reverse
        // order deletes leaves first.
        for path in discovered.iter().rev() {
            match self.store.delete(path).await {
                Ok(()) | Err(TreeStoreError::NoNode { .. }) => {}
                Err(err) => warn!(path, error = %err, "subtree delete skipped a node"),
            }
        }
        Ok(())
    }
}

pub(crate) fn require_job(job: &str) -> Result<(), JobError> {
    if job.is_empty() {
        return Err(JobError::InvalidArgument {
            reason: "job name must be non-empty".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn require_job_task(job: &str, task: &str) -> Result<(), JobError> {
    if job.is_empty() || task.is_empty() {
        return Err(JobError::InvalidArgument {
            reason: "job and task names must be non-empty".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alder_cache::CacheClient;
    use alder_testing::DeterministicCacheConnector;
    use alder_testing::DeterministicCacheServer;
    use alder_testing::DeterministicTree;
    use alder_testing::DeterministicTreeSession;

    use super::*;

    async fn coordinator(
        tree: &DeterministicTree,
    ) -> JobCoordinator<DeterministicTreeSession, CacheClient<DeterministicCacheConnector>> {
        let session = tree.session().await;
        let locks = Arc::new(
            CacheClient::connect(
                DeterministicCacheConnector::new(DeterministicCacheServer::new()),
                Duration::from_secs(1),
            )
            .await
            .unwrap(),
        );
        JobCoordinator::new(session, locks, TreeNamespace::default())
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let tree = DeterministicTree::new();
        let c = coordinator(&tree).await;

        c.bootstrap().await.unwrap();
        c.bootstrap().await.unwrap();
        assert!(c.store.exists(&c.namespace.worker_root()).await.unwrap());
        assert!(c.store.exists(&c.namespace.job_config_root()).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_chain_creates_missing_segments_only() {
        let tree = DeterministicTree::new();
        let c = coordinator(&tree).await;

        c.ensure_chain("/a/b/c").await.unwrap();
        c.ensure_chain("/a/b/c/d").await.unwrap();
        assert!(c.store.exists("/a/b/c/d").await.unwrap());
    }

    #[tokio::test]
    async fn purge_tree_deletes_children_before_parents() {
        let tree = DeterministicTree::new();
        let c = coordinator(&tree).await;

        c.ensure_chain("/p/x/deep").await.unwrap();
        c.ensure_chain("/p/y").await.unwrap();

        c.purge_tree("/p").await.unwrap();
        assert!(!c.store.exists("/p").await.unwrap());
        assert!(!c.store.exists("/p/x/deep").await.unwrap());

        // Purging an absent subtree is not an error.
        c.purge_tree("/p").await.unwrap();
    }
}
