//! In-memory registry of live and finished jobs.

use std::sync::Arc;

use dashmap::DashMap;

use super::model::{JobControl, JobId, JobSnapshot};
use crate::{Error, Result};

/// Concurrent map of every job the service knows about.
///
/// Jobs stay registered after they finish so pollers can read the final
/// snapshot; `remove_terminal` is the explicit cleanup.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<dyn JobControl>>,
}

impl JobRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job.
    pub fn insert(&self, control: Arc<dyn JobControl>) {
        self.jobs.insert(control.id(), control);
    }

    /// Look up a job's control handle.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<Arc<dyn JobControl>> {
        self.jobs.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Point-in-time view of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for an unknown id.
    pub fn snapshot(&self, id: JobId) -> Result<JobSnapshot> {
        self.get(id)
            .map(|control| control.snapshot())
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// Request cooperative cancellation of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for an unknown id.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        self.get(id)
            .map(|control| control.cancel())
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// Mark a finished export as fetched by the user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for an unknown id and
    /// [`Error::Unsupported`] when the job is not a finished export.
    pub fn mark_downloaded(&self, id: JobId) -> Result<()> {
        let control = self
            .get(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        if control.mark_downloaded() {
            Ok(())
        } else {
            Err(Error::Unsupported("mark_downloaded on an unfinished job"))
        }
    }

    /// Forget a job that already reached a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for an unknown id. Running or queued
    /// jobs are left in place and reported as unsupported.
    pub fn remove_terminal(&self, id: JobId) -> Result<()> {
        let control = self
            .get(id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        if !control.snapshot().status.is_terminal() {
            return Err(Error::Unsupported("remove of a job still in flight"));
        }
        self.jobs.remove(&id);
        Ok(())
    }

    /// Snapshots of every job a user enqueued, newest first.
    #[must_use]
    pub fn snapshots_for_user(&self, user_id: &str) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().user_id() == user_id)
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::job::model::{Job, JobKind, JobStatus, SyncProgress};

    fn sync_job(user: &str) -> Arc<dyn JobControl> {
        Arc::new(Job::<SyncProgress>::new(JobKind::Sync, user))
    }

    #[test]
    fn snapshot_of_unknown_job_is_not_found() {
        let registry = JobRegistry::new();
        let err = registry.snapshot(JobId::new()).unwrap_err();
        assert!(matches!(err, Error::JobNotFound(_)));
    }

    #[test]
    fn cancel_trips_the_token() {
        let registry = JobRegistry::new();
        let job = sync_job("alice");
        let token = job.cancel_token();
        registry.insert(Arc::clone(&job));

        registry.cancel(job.id()).unwrap();
        assert!(token.is_cancelled());
    }

    #[test]
    fn remove_rejects_jobs_in_flight() {
        let registry = JobRegistry::new();
        let job = sync_job("alice");
        registry.insert(Arc::clone(&job));

        assert!(registry.remove_terminal(job.id()).is_err());

        job.mark_finished(JobStatus::Completed, None);
        registry.remove_terminal(job.id()).unwrap();
        assert!(registry.get(job.id()).is_none());
    }

    #[test]
    fn snapshots_are_scoped_per_user() {
        let registry = JobRegistry::new();
        registry.insert(sync_job("alice"));
        registry.insert(sync_job("alice"));
        registry.insert(sync_job("bob"));

        assert_eq!(registry.snapshots_for_user("alice").len(), 2);
        assert_eq!(registry.snapshots_for_user("bob").len(), 1);
        assert!(registry.snapshots_for_user("carol").is_empty());
    }
}
