//! Watch-driven wakeup for task waiters.

use std::time::Duration;

use alder_cache::LockProvider;
use alder_core::TreeStore;
use tracing::debug;

use super::JobCoordinator;
use crate::error::JobError;

impl<S: TreeStore + ?Sized, L: LockProvider + ?Sized> JobCoordinator<S, L> {
    /// Block until a task may be waiting for `job` (or any job), up to
    /// `timeout` (`Some(0)` = non-blocking, `None` = unbounded).
    ///
    /// The wakeup is a level-triggered hint: the selection listings arm
    /// watches, and any watched change - or session close - wakes every
    /// waiter. Waking does not guarantee a matching task exists; the caller
    /// re-runs selection (typically via
    /// [`take_task`](Self::take_task)) and comes back here when it loses
    /// the race.
    pub async fn wait_for_new_task(&self, job: Option<&str>, timeout: Option<Duration>) -> Result<(), JobError> {
        {
            let state = self.state.lock().await;
            if state.worker.is_none() {
                return Err(JobError::NotInitialized {
                    operation: "wait_for_new_task",
                });
            }
        }

        // Subscribe before the fast-path check: a task enqueued between the
        // listing and the blocking wait still produces a wake.
        let mut events = self.store.subscribe();

        if self.select_waiting_task(job).await?.is_some() {
            return Ok(());
        }

        let Some(budget) = timeout else {
            // Unbounded: any event - change hint, overflow, or channel
            // close on shutdown - counts as a wake.
            let _ = events.recv().await;
            return Ok(());
        };
        if budget.is_zero() {
            return Err(JobError::TimedOut {
                operation: "wait_for_new_task",
            });
        }

        match tokio::time::timeout(budget, events.recv()).await {
            Ok(event) => {
                debug!(?event, "task waiter woken");
                Ok(())
            }
            Err(_) => Err(JobError::TimedOut {
                operation: "wait_for_new_task",
            }),
        }
    }
}
