//! Per-category worker tasks.
//!
//! One long-lived tokio task per [`JobCategory`]: jobs in the same
//! category run one at a time, categories run concurrently. A supervisor
//! wraps each run loop and respawns it if it panics; the job that was in
//! flight is marked `Failed` so pollers never see a stuck `Running`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::model::{JobCategory, JobControl, JobStatus};
use crate::{Error, Result};

/// How a job run finished, when it finished at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every item succeeded.
    Clean,
    /// The run completed but some items failed or were skipped.
    WithErrors,
}

/// Work item handed to a category worker.
pub struct QueuedJob {
    /// Registry handle for lifecycle transitions.
    pub control: Arc<dyn JobControl>,
    /// The job body. Built lazily so enqueue stays cheap.
    pub run: Box<dyn FnOnce() -> BoxFuture<'static, Result<JobOutcome>> + Send>,
}

type CurrentJob = Arc<Mutex<Option<Arc<dyn JobControl>>>>;

/// Sender side of the per-category queues.
pub struct JobQueues {
    senders: HashMap<JobCategory, mpsc::UnboundedSender<QueuedJob>>,
}

impl JobQueues {
    /// Hand a job to its category worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the worker is gone, which only
    /// happens during shutdown.
    pub fn enqueue(&self, job: QueuedJob) -> Result<()> {
        let category = job.control.category();
        let Some(sender) = self.senders.get(&category) else {
            return Err(Error::Connection(format!(
                "no worker for category {category:?}"
            )));
        };
        sender.send(job).map_err(|_| {
            Error::Connection(format!("worker for category {category:?} is shut down"))
        })
    }
}

/// Spawn one supervised worker per category and return the queues.
#[must_use]
pub fn spawn_workers() -> JobQueues {
    let mut senders = HashMap::new();
    for category in JobCategory::ALL {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(category, tx);
        tokio::spawn(supervise(category, rx));
    }
    JobQueues { senders }
}

/// Keep a category's run loop alive across panics.
async fn supervise(category: JobCategory, rx: mpsc::UnboundedReceiver<QueuedJob>) {
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let current: CurrentJob = Arc::new(Mutex::new(None));

    loop {
        let handle = tokio::spawn(run_loop(Arc::clone(&rx), Arc::clone(&current)));
        match handle.await {
            Ok(()) => {
                info!(?category, "job worker stopped, queue closed");
                return;
            }
            Err(join_error) => {
                error!(?category, %join_error, "job worker crashed, respawning");
                if let Some(control) = lock(&current).take() {
                    control.mark_finished(
                        JobStatus::Failed,
                        Some("worker crashed while the job was running".to_string()),
                    );
                }
            }
        }
    }
}

async fn run_loop(
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    current: CurrentJob,
) {
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(job) = next else {
            return;
        };
        let control = Arc::clone(&job.control);

        // A job cancelled while still queued never runs.
        if control.cancel_token().is_cancelled() {
            control.mark_finished(JobStatus::Cancelled, None);
            continue;
        }

        *lock(&current) = Some(Arc::clone(&control));
        control.mark_running();

        let result = (job.run)().await;
        match result {
            Ok(JobOutcome::Clean) => control.mark_finished(JobStatus::Completed, None),
            Ok(JobOutcome::WithErrors) => {
                control.mark_finished(JobStatus::CompletedWithErrors, None);
            }
            Err(Error::Cancelled) => control.mark_finished(JobStatus::Cancelled, None),
            Err(e) => {
                warn!(job_id = %control.id(), error = %e, "job failed");
                control.mark_finished(JobStatus::Failed, Some(e.to_string()));
            }
        }

        *lock(&current) = None;
    }
}

fn lock(current: &CurrentJob) -> MutexGuard<'_, Option<Arc<dyn JobControl>>> {
    current.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::job::model::{Job, JobKind, JobSnapshot, SyncProgress};
    use std::time::Duration;

    fn queued(
        control: Arc<dyn JobControl>,
        run: impl FnOnce() -> BoxFuture<'static, Result<JobOutcome>> + Send + 'static,
    ) -> QueuedJob {
        QueuedJob {
            control,
            run: Box::new(run),
        }
    }

    async fn wait_terminal(control: &Arc<dyn JobControl>) -> JobSnapshot {
        for _ in 0..200 {
            let snapshot = control.snapshot();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn outcomes_map_to_statuses() {
        let queues = spawn_workers();

        let clean: Arc<dyn JobControl> = Arc::new(Job::<SyncProgress>::new(JobKind::Sync, "a"));
        queues
            .enqueue(queued(Arc::clone(&clean), || {
                Box::pin(async { Ok(JobOutcome::Clean) })
            }))
            .unwrap();
        assert_eq!(wait_terminal(&clean).await.status, JobStatus::Completed);

        let dirty: Arc<dyn JobControl> = Arc::new(Job::<SyncProgress>::new(JobKind::Sync, "a"));
        queues
            .enqueue(queued(Arc::clone(&dirty), || {
                Box::pin(async { Ok(JobOutcome::WithErrors) })
            }))
            .unwrap();
        assert_eq!(
            wait_terminal(&dirty).await.status,
            JobStatus::CompletedWithErrors
        );

        let failed: Arc<dyn JobControl> = Arc::new(Job::<SyncProgress>::new(JobKind::Sync, "a"));
        queues
            .enqueue(queued(Arc::clone(&failed), || {
                Box::pin(async { Err(Error::Connection("refused".to_string())) })
            }))
            .unwrap();
        let snapshot = wait_terminal(&failed).await;
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot.error_message.unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn cancelled_before_start_never_runs() {
        let queues = spawn_workers();
        let control: Arc<dyn JobControl> = Arc::new(Job::<SyncProgress>::new(JobKind::Sync, "a"));
        control.cancel();

        queues
            .enqueue(queued(Arc::clone(&control), || {
                Box::pin(async { panic!("must not run") })
            }))
            .unwrap();

        let snapshot = wait_terminal(&control).await;
        assert_eq!(snapshot.status, JobStatus::Cancelled);
        assert!(snapshot.started_at.is_none());
    }

    #[tokio::test]
    async fn same_category_runs_sequentially() {
        let queues = spawn_workers();
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

        let first: Arc<dyn JobControl> = Arc::new(Job::<SyncProgress>::new(JobKind::Sync, "a"));
        queues
            .enqueue(queued(Arc::clone(&first), move || {
                Box::pin(async move {
                    let _ = gate_rx.await;
                    Ok(JobOutcome::Clean)
                })
            }))
            .unwrap();

        let second: Arc<dyn JobControl> = Arc::new(Job::<SyncProgress>::new(JobKind::Resync, "a"));
        queues
            .enqueue(queued(Arc::clone(&second), || {
                Box::pin(async { Ok(JobOutcome::Clean) })
            }))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(second.snapshot().status, JobStatus::Queued);

        gate_tx.send(()).unwrap();
        assert_eq!(wait_terminal(&second).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn panicking_job_is_marked_failed_and_worker_survives() {
        let queues = spawn_workers();

        let bomb: Arc<dyn JobControl> = Arc::new(Job::<SyncProgress>::new(JobKind::Sync, "a"));
        queues
            .enqueue(queued(Arc::clone(&bomb), || {
                Box::pin(async { panic!("boom") })
            }))
            .unwrap();
        assert_eq!(wait_terminal(&bomb).await.status, JobStatus::Failed);

        // Worker respawned and still accepts jobs.
        let next: Arc<dyn JobControl> = Arc::new(Job::<SyncProgress>::new(JobKind::Sync, "a"));
        queues
            .enqueue(queued(Arc::clone(&next), || {
                Box::pin(async { Ok(JobOutcome::Clean) })
            }))
            .unwrap();
        assert_eq!(wait_terminal(&next).await.status, JobStatus::Completed);
    }
}
