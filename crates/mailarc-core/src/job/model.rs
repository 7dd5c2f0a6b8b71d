//! Job envelope, status lifecycle and progress payloads.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a fresh random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from its string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for its category worker.
    Queued,
    /// Currently executing.
    Running,
    /// Finished with no per-item failures.
    Completed,
    /// Finished, but some items failed or were skipped.
    CompletedWithErrors,
    /// Export artifact fetched by the user. Post-terminal marker.
    Downloaded,
    /// Aborted by a fatal error.
    Failed,
    /// Stopped by a cancellation request.
    Cancelled,
}

impl JobStatus {
    /// Whether the job will never run again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::CompletedWithErrors
                | Self::Downloaded
                | Self::Failed
                | Self::Cancelled
        )
    }
}

/// Worker lane a job runs on. Jobs of the same category run sequentially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobCategory {
    /// Mailbox synchronization.
    Sync,
    /// Restoring archived emails to a mailbox.
    Restore,
    /// Local file imports.
    Import,
    /// Archive exports.
    Export,
    /// Email and account deletion.
    Deletion,
}

impl JobCategory {
    /// Every category, used to spawn one worker each.
    pub const ALL: [Self; 5] = [
        Self::Sync,
        Self::Restore,
        Self::Import,
        Self::Export,
        Self::Deletion,
    ];
}

/// Concrete operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Incremental sync from the account's last sync point.
    Sync,
    /// Full sync from the beginning of time.
    Resync,
    /// Restore archived emails to a mailbox folder.
    Restore,
    /// Import from an mbox file.
    MboxImport,
    /// Import from a batch of EML files.
    EmlImport,
    /// Export archived emails to a file artifact.
    Export,
    /// Delete an account and its unlocked archive rows.
    AccountDeletion,
    /// Delete a selection of unlocked archived emails.
    EmailDeletion,
}

impl JobKind {
    /// The worker lane this kind runs on.
    #[must_use]
    pub const fn category(self) -> JobCategory {
        match self {
            Self::Sync | Self::Resync => JobCategory::Sync,
            Self::Restore => JobCategory::Restore,
            Self::MboxImport | Self::EmlImport => JobCategory::Import,
            Self::Export => JobCategory::Export,
            Self::AccountDeletion | Self::EmailDeletion => JobCategory::Deletion,
        }
    }
}

/// Progress payload of a job. Counters are atomics so the worker can
/// increment without a lock while pollers read monotonic values.
pub trait JobProgress: Send + Sync + 'static {
    /// Plain-integer view for snapshots.
    fn report(&self) -> ProgressReport;
}

/// Progress of a sync or resync job.
#[derive(Debug, Default)]
pub struct SyncProgress {
    /// Folders the sync will visit.
    pub folders_total: AtomicU64,
    /// Folders fully scanned so far.
    pub folders_processed: AtomicU64,
    /// Messages seen (new or already archived).
    pub processed_emails: AtomicU64,
    /// Messages newly archived.
    pub new_emails: AtomicU64,
    /// Messages that failed to fetch, parse or store.
    pub failed_emails: AtomicU64,
}

impl JobProgress for SyncProgress {
    fn report(&self) -> ProgressReport {
        ProgressReport::Sync {
            folders_total: self.folders_total.load(Ordering::Relaxed),
            folders_processed: self.folders_processed.load(Ordering::Relaxed),
            processed_emails: self.processed_emails.load(Ordering::Relaxed),
            new_emails: self.new_emails.load(Ordering::Relaxed),
            failed_emails: self.failed_emails.load(Ordering::Relaxed),
        }
    }
}

/// Progress of a restore job.
#[derive(Debug, Default)]
pub struct RestoreProgress {
    /// Emails selected for restore.
    pub total: AtomicU64,
    /// Emails attempted so far.
    pub processed: AtomicU64,
    /// Emails appended to the mailbox.
    pub succeeded: AtomicU64,
    /// Emails that failed to upload.
    pub failed: AtomicU64,
}

impl JobProgress for RestoreProgress {
    fn report(&self) -> ProgressReport {
        ProgressReport::Restore {
            total: self.total.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Progress of an mbox or EML import job.
#[derive(Debug, Default)]
pub struct ImportProgress {
    /// Input size in bytes, when known.
    pub bytes_total: AtomicU64,
    /// Bytes consumed from the input so far.
    pub bytes_processed: AtomicU64,
    /// Estimated message count (size heuristic for mbox, file count for EML).
    pub estimated_total: AtomicU64,
    /// Messages read from the input.
    pub processed: AtomicU64,
    /// Messages newly archived.
    pub imported: AtomicU64,
    /// Messages skipped as duplicates (dedup key or content hash).
    pub duplicates: AtomicU64,
    /// Messages skipped because they failed to parse.
    pub skipped_malformed: AtomicU64,
}

impl JobProgress for ImportProgress {
    fn report(&self) -> ProgressReport {
        ProgressReport::Import {
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            estimated_total: self.estimated_total.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            imported: self.imported.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            skipped_malformed: self.skipped_malformed.load(Ordering::Relaxed),
        }
    }
}

/// Finished export location, set once on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportArtifact {
    /// File the export was written to.
    pub path: PathBuf,
    /// Size of the artifact in bytes.
    pub size_bytes: u64,
}

/// Progress of an export job.
#[derive(Debug, Default)]
pub struct ExportProgress {
    /// Emails selected for export.
    pub total_emails: AtomicU64,
    /// Emails written so far.
    pub processed_emails: AtomicU64,
    output: Mutex<Option<ExportArtifact>>,
}

impl ExportProgress {
    /// Record the finished artifact.
    pub fn set_output(&self, artifact: ExportArtifact) {
        *lock(&self.output) = Some(artifact);
    }

    /// The finished artifact, if the export completed.
    #[must_use]
    pub fn output(&self) -> Option<ExportArtifact> {
        lock(&self.output).clone()
    }
}

impl JobProgress for ExportProgress {
    fn report(&self) -> ProgressReport {
        ProgressReport::Export {
            total_emails: self.total_emails.load(Ordering::Relaxed),
            processed_emails: self.processed_emails.load(Ordering::Relaxed),
            output: self.output(),
        }
    }
}

/// Progress of a deletion job.
#[derive(Debug, Default)]
pub struct DeletionProgress {
    /// Emails selected for deletion.
    pub total: AtomicU64,
    /// Emails removed.
    pub deleted: AtomicU64,
    /// Emails that could not be removed (locked rows included).
    pub failed: AtomicU64,
}

impl JobProgress for DeletionProgress {
    fn report(&self) -> ProgressReport {
        ProgressReport::Deletion {
            total: self.total.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Plain-integer progress view handed to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressReport {
    /// Sync progress counters.
    Sync {
        /// Folders the sync will visit.
        folders_total: u64,
        /// Folders fully scanned.
        folders_processed: u64,
        /// Messages seen.
        processed_emails: u64,
        /// Messages newly archived.
        new_emails: u64,
        /// Messages that failed.
        failed_emails: u64,
    },
    /// Restore progress counters.
    Restore {
        /// Emails selected.
        total: u64,
        /// Emails attempted.
        processed: u64,
        /// Emails uploaded.
        succeeded: u64,
        /// Emails that failed.
        failed: u64,
    },
    /// Import progress counters.
    Import {
        /// Input size in bytes.
        bytes_total: u64,
        /// Bytes consumed.
        bytes_processed: u64,
        /// Estimated message count.
        estimated_total: u64,
        /// Messages read.
        processed: u64,
        /// Messages archived.
        imported: u64,
        /// Duplicate skips.
        duplicates: u64,
        /// Malformed skips.
        skipped_malformed: u64,
    },
    /// Export progress counters.
    Export {
        /// Emails selected.
        total_emails: u64,
        /// Emails written.
        processed_emails: u64,
        /// Finished artifact, once complete.
        output: Option<ExportArtifact>,
    },
    /// Deletion progress counters.
    Deletion {
        /// Emails selected.
        total: u64,
        /// Emails removed.
        deleted: u64,
        /// Emails that could not be removed.
        failed: u64,
    },
}

/// Point-in-time view of a job handed to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// Job identifier.
    pub id: JobId,
    /// Operation performed.
    pub kind: JobKind,
    /// Worker lane.
    pub category: JobCategory,
    /// Lifecycle status at snapshot time.
    pub status: JobStatus,
    /// Application user who enqueued the job.
    pub user_id: String,
    /// When the job was accepted.
    pub created_at: DateTime<Utc>,
    /// When the worker picked it up.
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Fatal error message, for failed jobs.
    pub error_message: Option<String>,
    /// Progress counters.
    pub progress: ProgressReport,
}

#[derive(Debug)]
struct Lifecycle {
    status: JobStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

/// A background job envelope.
///
/// Lifecycle fields sit behind a mutex; the progress payload uses atomics
/// so the hot path never takes that lock.
#[derive(Debug)]
pub struct Job<P: JobProgress> {
    id: JobId,
    user_id: String,
    kind: JobKind,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
    /// Progress counters the running task increments. Shared so the job
    /// body can own a handle while the registry snapshots it.
    pub progress: Arc<P>,
}

impl<P: JobProgress + Default> Job<P> {
    /// Create a queued job for a user.
    #[must_use]
    pub fn new(kind: JobKind, user_id: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            kind,
            lifecycle: Mutex::new(Lifecycle {
                status: JobStatus::Queued,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                error_message: None,
            }),
            cancel: CancellationToken::new(),
            progress: Arc::new(P::default()),
        }
    }
}

/// Object-safe control surface stored in the registry.
pub trait JobControl: Send + Sync {
    /// Job identifier.
    fn id(&self) -> JobId;
    /// User who enqueued the job.
    fn user_id(&self) -> &str;
    /// Operation performed.
    fn kind(&self) -> JobKind;
    /// Worker lane.
    fn category(&self) -> JobCategory {
        self.kind().category()
    }
    /// Point-in-time view of the job.
    fn snapshot(&self) -> JobSnapshot;
    /// Request cooperative cancellation.
    fn cancel(&self);
    /// Token the running task watches.
    fn cancel_token(&self) -> CancellationToken;
    /// Transition `Queued -> Running`. No-op once terminal.
    fn mark_running(&self);
    /// Transition into a terminal status. Terminal states are final.
    fn mark_finished(&self, status: JobStatus, error_message: Option<String>);
    /// Mark a finished export as fetched. Returns whether the transition
    /// applied (`Completed`/`CompletedWithErrors` only).
    fn mark_downloaded(&self) -> bool;
}

impl<P: JobProgress> JobControl for Job<P> {
    fn id(&self) -> JobId {
        self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn kind(&self) -> JobKind {
        self.kind
    }

    fn snapshot(&self) -> JobSnapshot {
        let lifecycle = lock(&self.lifecycle);
        JobSnapshot {
            id: self.id,
            kind: self.kind,
            category: self.kind.category(),
            status: lifecycle.status,
            user_id: self.user_id.clone(),
            created_at: lifecycle.created_at,
            started_at: lifecycle.started_at,
            completed_at: lifecycle.completed_at,
            error_message: lifecycle.error_message.clone(),
            progress: self.progress.report(),
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn mark_running(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.status == JobStatus::Queued {
            lifecycle.status = JobStatus::Running;
            lifecycle.started_at = Some(Utc::now());
        }
    }

    fn mark_finished(&self, status: JobStatus, error_message: Option<String>) {
        debug_assert!(status.is_terminal());
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.status.is_terminal() {
            return;
        }
        lifecycle.status = status;
        lifecycle.completed_at = Some(Utc::now());
        lifecycle.error_message = error_message;
    }

    fn mark_downloaded(&self) -> bool {
        let mut lifecycle = lock(&self.lifecycle);
        if matches!(
            lifecycle.status,
            JobStatus::Completed | JobStatus::CompletedWithErrors
        ) {
            lifecycle.status = JobStatus::Downloaded;
            true
        } else {
            false
        }
    }
}

/// Lock helper that shrugs off poisoning; a panicked incrementer cannot
/// leave these plain-data fields inconsistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_category() {
        assert_eq!(JobKind::Sync.category(), JobCategory::Sync);
        assert_eq!(JobKind::Resync.category(), JobCategory::Sync);
        assert_eq!(JobKind::MboxImport.category(), JobCategory::Import);
        assert_eq!(JobKind::AccountDeletion.category(), JobCategory::Deletion);
    }

    #[test]
    fn terminal_states_are_final() {
        let job: Job<SyncProgress> = Job::new(JobKind::Sync, "alice");
        assert_eq!(job.snapshot().status, JobStatus::Queued);

        job.mark_running();
        assert_eq!(job.snapshot().status, JobStatus::Running);

        job.mark_finished(JobStatus::Cancelled, None);
        assert_eq!(job.snapshot().status, JobStatus::Cancelled);

        // A later completion attempt must not overwrite the terminal state.
        job.mark_finished(JobStatus::Completed, None);
        assert_eq!(job.snapshot().status, JobStatus::Cancelled);
        assert!(!job.mark_downloaded());
    }

    #[test]
    fn downloaded_only_from_completed() {
        let job: Job<ExportProgress> = Job::new(JobKind::Export, "alice");
        assert!(!job.mark_downloaded());

        job.mark_running();
        job.mark_finished(JobStatus::Completed, None);
        assert!(job.mark_downloaded());
        assert_eq!(job.snapshot().status, JobStatus::Downloaded);
    }

    #[test]
    fn export_output_is_set_once_visible_in_report() {
        let progress = ExportProgress::default();
        assert_eq!(
            progress.report(),
            ProgressReport::Export {
                total_emails: 0,
                processed_emails: 0,
                output: None
            }
        );

        progress.set_output(ExportArtifact {
            path: PathBuf::from("/tmp/export.mbox"),
            size_bytes: 42,
        });
        match progress.report() {
            ProgressReport::Export { output: Some(a), .. } => assert_eq!(a.size_bytes, 42),
            other => panic!("unexpected report {other:?}"),
        }
    }
}
