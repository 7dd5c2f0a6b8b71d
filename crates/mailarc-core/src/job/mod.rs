//! Background job model, registry, workers and pacing.
//!
//! Jobs live in memory only; a restart forgets them. Long-running work
//! (sync, restore, import, export, deletion) goes through one worker per
//! category so jobs of the same category never run concurrently.

mod model;
mod pacing;
mod registry;
mod worker;

pub use model::{
    DeletionProgress, ExportArtifact, ExportProgress, ImportProgress, Job, JobCategory, JobControl,
    JobId, JobKind, JobProgress, JobSnapshot, JobStatus, ProgressReport, RestoreProgress,
    SyncProgress,
};
pub use pacing::{Pacer, PacingConfig};
pub use registry::JobRegistry;
pub use worker::{JobOutcome, JobQueues, QueuedJob, spawn_workers};
