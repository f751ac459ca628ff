//! The task queue protocol: enqueue, lease, finish, release, status.

use std::collections::BTreeSet;

use alder_cache::LockProvider;
use alder_core::CreateMode;
use alder_core::TreeStore;
use alder_core::TreeStoreError;
use tracing::debug;
use tracing::info;

use super::ActiveLease;
use super::JobCoordinator;
use super::TakenTask;
use super::TaskStatus;
use super::require_job;
use super::require_job_task;
use crate::error::JobError;
use crate::paths::leaf_name;

impl<S: TreeStore + ?Sized, L: LockProvider + ?Sized> JobCoordinator<S, L> {
    /// Enqueue a task for `job`, returning the store-assigned task name.
    ///
    /// No lock: the store's atomic sequential naming is all the
    /// serialization enqueue needs.
    pub async fn add_task(&self, job: &str, data: &[u8]) -> Result<String, JobError> {
        require_job(job)?;
        let assigned = match self
            .store
            .create(&self.namespace.task_stem(job), data.to_vec(), CreateMode::PERSISTENT_SEQUENTIAL)
            .await
        {
            Ok(assigned) => assigned,
            Err(TreeStoreError::NoNode { .. }) => {
                return Err(JobError::NotFound {
                    what: format!("job '{job}'"),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let task = leaf_name(&assigned)
            .ok_or_else(|| JobError::Unexpected {
                reason: format!("malformed assigned task path '{assigned}'"),
            })?
            .to_string();
        debug!(job, task, "task enqueued");
        Ok(task)
    }

    /// Find the oldest waiting task, either for the given job or for the
    /// first job (in listing order) that has one.
    ///
    /// Waiting = present in ordering, absent from working. Sequence numbers
    /// grow monotonically, so the smallest remaining name is the oldest and
    /// selection is FIFO per job. Across jobs the listing order of the
    /// config root decides, which is best-effort only. Listings install
    /// watches, arming [`wait_for_new_task`](Self::wait_for_new_task).
    pub async fn select_waiting_task(&self, job: Option<&str>) -> Result<Option<(String, String)>, JobError> {
        let jobs: Vec<String> = match job {
            Some(job) => vec![job.to_string()],
            None => match self.store.get_children(&self.namespace.job_config_root(), true).await {
                Ok(children) => children,
                Err(TreeStoreError::NoNode { .. }) => Vec::new(),
                Err(err) => return Err(err.into()),
            },
        };

        for job in jobs {
            if let Some(task) = self.waiting_task_for(&job).await? {
                return Ok(Some((job, task)));
            }
        }
        Ok(None)
    }

    /// Lease a waiting task to this instance's worker.
    ///
    /// The lease transfer is the atomic creation of the ephemeral working
    /// entry: whoever creates it first owns the task, and a lost race just
    /// means selecting again. The working entry dies with this session, so
    /// a crashed worker's task becomes selectable without any timeout logic
    /// here.
    pub async fn take_task(&self, job: Option<&str>) -> Result<TakenTask, JobError> {
        let mut state = self.state.lock().await;
        if state.worker.is_none() {
            return Err(JobError::NotInitialized {
                operation: "take_task",
            });
        }
        if state.lease.is_some() {
            return Err(JobError::AlreadyExists {
                what: "active task lease".to_string(),
            });
        }

        loop {
            let Some((job, task)) = self.select_waiting_task(job).await? else {
                return Err(JobError::NotFound {
                    what: "waiting task".to_string(),
                });
            };

            let working = self.namespace.working(&job, &task);
            match self.store.create(&working, Vec::new(), CreateMode::EPHEMERAL).await {
                Ok(_) => {}
                Err(TreeStoreError::NodeExists { .. }) => {
                    debug!(job, task, "lost lease race, selecting again");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            match self.store.get_data(&self.namespace.ordering(&job, &task)).await {
                Ok(data) => {
                    info!(job, task, "task leased");
                    state.lease = Some(ActiveLease {
                        job: job.clone(),
                        task: task.clone(),
                    });
                    return Ok(TakenTask { job, task, data });
                }
                Err(TreeStoreError::NoNode { .. }) => {
                    // Finished under us between listing and read. Drop the
                    // claim and select again.
                    let _ = self.store.delete(&working).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Complete the held task: remove it from the queue entirely.
    ///
    /// The ordering entry goes first; failing to remove it does not fail
    /// the call (terminate_job sweeps leftovers). Failing to remove the
    /// working entry does. The lease is cleared either way.
    pub async fn finish_task(&self, job: &str, task: &str) -> Result<(), JobError> {
        require_job_task(job, task)?;
        let mut state = self.state.lock().await;
        self.require_matching_lease(&state, job, task, "finish_task")?;

        if let Err(err) = self.store.delete(&self.namespace.ordering(job, task)).await {
            debug!(job, task, error = %err, "ordering entry delete failed");
        }

        let result = match self.store.delete(&self.namespace.working(job, task)).await {
            Ok(()) => Ok(()),
            Err(err) => Err(err.into()),
        };
        state.lease = None;
        if result.is_ok() {
            info!(job, task, "task finished");
        }
        result
    }

    /// Give the held task back: it becomes selectable again.
    pub async fn release_task(&self, job: &str, task: &str) -> Result<(), JobError> {
        require_job_task(job, task)?;
        let mut state = self.state.lock().await;
        self.require_matching_lease(&state, job, task, "release_task")?;

        let result = match self.store.delete(&self.namespace.working(job, task)).await {
            Ok(()) => Ok(()),
            Err(err) => Err(err.into()),
        };
        state.lease = None;
        if result.is_ok() {
            info!(job, task, "task released");
        }
        result
    }

    /// Derive a task's state from its subtree presence.
    ///
    /// The two existence checks are independent, not atomic; the answer is
    /// advisory and must not be used for mutual exclusion.
    pub async fn task_status(&self, job: &str, task: &str) -> Result<TaskStatus, JobError> {
        require_job_task(job, task)?;
        if !self.store.exists(&self.namespace.ordering(job, task)).await? {
            return Ok(TaskStatus::NotExists);
        }
        if self.store.exists(&self.namespace.working(job, task)).await? {
            Ok(TaskStatus::Running)
        } else {
            Ok(TaskStatus::Waiting)
        }
    }

    async fn waiting_task_for(&self, job: &str) -> Result<Option<String>, JobError> {
        let mut ordering = match self.store.get_children(&self.namespace.ordering_root(job), true).await {
            Ok(children) => children,
            Err(TreeStoreError::NoNode { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let working = match self.store.get_children(&self.namespace.working_root(job), true).await {
            Ok(children) => children,
            Err(TreeStoreError::NoNode { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        ordering.sort();
        let working: BTreeSet<String> = working.into_iter().collect();
        Ok(ordering.into_iter().find(|task| !working.contains(task)))
    }

    fn require_matching_lease(
        &self,
        state: &super::WorkerState,
        job: &str,
        task: &str,
        operation: &'static str,
    ) -> Result<(), JobError> {
        if state.worker.is_none() {
            return Err(JobError::NotInitialized { operation });
        }
        match &state.lease {
            Some(lease) if lease.job == job && lease.task == task => Ok(()),
            _ => Err(JobError::NotFound {
                what: format!("lease on '{job}/{task}'"),
            }),
        }
    }
}
