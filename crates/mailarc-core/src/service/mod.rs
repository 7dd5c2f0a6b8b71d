//! Orchestration facade over accounts, archive, providers and jobs.

mod export;

pub use export::ExportSelection;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::accesslog::{AccessLogRepository, AccessType};
use crate::account::{AccountRepository, MailAccountId};
use crate::archive::{ArchiveRepository, ArchivedEmailId};
use crate::codec::ExportFormat;
use crate::import::{import_eml_files, import_mbox_file};
use crate::job::{
    DeletionProgress, ExportProgress, ImportProgress, Job, JobControl, JobId, JobKind, JobOutcome,
    JobQueues, JobRegistry, JobSnapshot, PacingConfig, QueuedJob, RestoreProgress, SyncProgress,
    spawn_workers,
};
use crate::provider::ProviderServiceFactory;
use crate::{Error, Result};

/// Size thresholds for restore requests.
#[derive(Debug, Clone)]
pub struct RestoreLimits {
    /// At or above this count a restore becomes a background job.
    pub async_threshold: usize,
    /// Largest restore still served synchronously.
    pub max_sync_emails: usize,
    /// Hard cap; larger requests are rejected outright.
    pub max_async_emails: usize,
}

impl Default for RestoreLimits {
    fn default() -> Self {
        Self {
            async_threshold: 500,
            max_sync_emails: 500,
            max_async_emails: 10_000,
        }
    }
}

/// Tunables for the orchestration service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Pacing applied to bulk provider operations.
    pub pacing: PacingConfig,
    /// Restore request thresholds.
    pub restore_limits: RestoreLimits,
    /// Directory export artifacts are written to.
    pub artifact_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pacing: PacingConfig::default(),
            restore_limits: RestoreLimits::default(),
            artifact_dir: std::env::temp_dir().join("mailarc-exports"),
        }
    }
}

/// How a restore request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Served synchronously; counts are final.
    Immediate {
        /// Emails uploaded.
        succeeded: u64,
        /// Emails that failed.
        failed: u64,
    },
    /// Handed to the restore worker; poll the job for progress.
    Enqueued(JobId),
}

/// The application-facing archive service.
///
/// Owns the job workers; everything long-running is enqueued and
/// observed through [`JobSnapshot`]s.
pub struct ArchiveService {
    accounts: Arc<AccountRepository>,
    archive: Arc<ArchiveRepository>,
    access_log: Arc<AccessLogRepository>,
    factory: Arc<ProviderServiceFactory>,
    registry: Arc<JobRegistry>,
    queues: JobQueues,
    config: ServiceConfig,
}

impl ArchiveService {
    /// Build the service and spawn its job workers.
    ///
    /// Must run inside a tokio runtime.
    #[must_use]
    pub fn new(
        accounts: Arc<AccountRepository>,
        archive: Arc<ArchiveRepository>,
        access_log: Arc<AccessLogRepository>,
        config: ServiceConfig,
    ) -> Self {
        let factory = Arc::new(ProviderServiceFactory::new(
            Arc::clone(&accounts),
            Arc::clone(&archive),
            Arc::clone(&access_log),
            config.pacing.clone(),
        ));
        Self {
            accounts,
            archive,
            access_log,
            factory,
            registry: Arc::new(JobRegistry::new()),
            queues: spawn_workers(),
            config,
        }
    }

    /// Enqueue an incremental sync of an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for an unknown account.
    pub async fn enqueue_sync(&self, account_id: MailAccountId, user: &str) -> Result<JobId> {
        self.enqueue_sync_kind(account_id, user, JobKind::Sync).await
    }

    /// Enqueue a full resync from the beginning of time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for an unknown account.
    pub async fn enqueue_resync(&self, account_id: MailAccountId, user: &str) -> Result<JobId> {
        self.enqueue_sync_kind(account_id, user, JobKind::Resync)
            .await
    }

    async fn enqueue_sync_kind(
        &self,
        account_id: MailAccountId,
        user: &str,
        kind: JobKind,
    ) -> Result<JobId> {
        let account = self.accounts.get_required(account_id).await?;
        let service = self.factory.resolve(account.provider);

        let job = Arc::new(Job::<SyncProgress>::new(kind, user));
        let id = job.id();
        let progress = Arc::clone(&job.progress);
        let cancel = job.cancel_token();
        self.registry.insert(Arc::clone(&job) as Arc<dyn JobControl>);

        let run = Box::new(move || -> BoxFuture<'static, Result<JobOutcome>> {
            Box::pin(async move {
                let report = match kind {
                    JobKind::Resync => {
                        service
                            .resync_account(&account, Some(progress), &cancel)
                            .await?
                    }
                    _ => {
                        service
                            .sync_account(&account, Some(progress), &cancel)
                            .await?
                    }
                };
                Ok(if report.failed == 0 {
                    JobOutcome::Clean
                } else {
                    JobOutcome::WithErrors
                })
            })
        });
        self.queues.enqueue(QueuedJob { control: job, run })?;
        Ok(id)
    }

    /// Restore archived emails into a mailbox folder.
    ///
    /// Small requests run synchronously; requests at or above the async
    /// threshold become a restore job; requests above the hard cap are
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyEmails`] above the cap and
    /// [`Error::AccountNotFound`] for an unknown target account.
    pub async fn restore_emails(
        &self,
        ids: Vec<ArchivedEmailId>,
        target_account: MailAccountId,
        folder: &str,
        user: &str,
    ) -> Result<RestoreOutcome> {
        let limits = &self.config.restore_limits;
        if ids.len() > limits.max_async_emails {
            return Err(Error::TooManyEmails {
                requested: ids.len(),
                max: limits.max_async_emails,
            });
        }

        let account = self.accounts.get_required(target_account).await?;
        let service = self.factory.resolve(account.provider);

        if ids.len() < limits.async_threshold && ids.len() <= limits.max_sync_emails {
            let (succeeded, failed) = service
                .restore_many_with_progress(
                    &ids,
                    &account,
                    folder,
                    None,
                    &CancellationToken::new(),
                )
                .await?;
            return Ok(RestoreOutcome::Immediate { succeeded, failed });
        }

        let job = Arc::new(Job::<RestoreProgress>::new(JobKind::Restore, user));
        let id = job.id();
        let progress = Arc::clone(&job.progress);
        let cancel = job.cancel_token();
        self.registry.insert(Arc::clone(&job) as Arc<dyn JobControl>);

        let folder = folder.to_string();
        let run = Box::new(move || -> BoxFuture<'static, Result<JobOutcome>> {
            Box::pin(async move {
                let (_, failed) = service
                    .restore_many_with_progress(&ids, &account, &folder, Some(progress), &cancel)
                    .await?;
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                Ok(if failed == 0 {
                    JobOutcome::Clean
                } else {
                    JobOutcome::WithErrors
                })
            })
        });
        self.queues.enqueue(QueuedJob { control: job, run })?;
        Ok(RestoreOutcome::Enqueued(id))
    }

    /// Enqueue an mbox file import into an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for an unknown account.
    pub async fn enqueue_mbox_import(
        &self,
        path: PathBuf,
        account_id: MailAccountId,
        folder: Option<String>,
        user: &str,
    ) -> Result<JobId> {
        self.accounts.get_required(account_id).await?;

        let job = Arc::new(Job::<ImportProgress>::new(JobKind::MboxImport, user));
        let id = job.id();
        let progress = Arc::clone(&job.progress);
        let cancel = job.cancel_token();
        self.registry.insert(Arc::clone(&job) as Arc<dyn JobControl>);

        let archive = Arc::clone(&self.archive);
        let pacing = self.config.pacing.clone();
        let folder = folder.unwrap_or_else(|| "Import".to_string());
        let run = Box::new(move || -> BoxFuture<'static, Result<JobOutcome>> {
            Box::pin(async move {
                import_mbox_file(
                    &archive, account_id, &folder, &path, pacing, &progress, &cancel,
                )
                .await
            })
        });
        self.queues.enqueue(QueuedJob { control: job, run })?;
        Ok(id)
    }

    /// Enqueue a batch of EML files as one import job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for an unknown account.
    pub async fn enqueue_eml_import(
        &self,
        paths: Vec<PathBuf>,
        account_id: MailAccountId,
        folder: Option<String>,
        user: &str,
    ) -> Result<JobId> {
        self.accounts.get_required(account_id).await?;

        let job = Arc::new(Job::<ImportProgress>::new(JobKind::EmlImport, user));
        let id = job.id();
        let progress = Arc::clone(&job.progress);
        let cancel = job.cancel_token();
        self.registry.insert(Arc::clone(&job) as Arc<dyn JobControl>);

        let archive = Arc::clone(&self.archive);
        let pacing = self.config.pacing.clone();
        let folder = folder.unwrap_or_else(|| "Import".to_string());
        let run = Box::new(move || -> BoxFuture<'static, Result<JobOutcome>> {
            Box::pin(async move {
                import_eml_files(
                    &archive, account_id, &folder, &paths, pacing, &progress, &cancel,
                )
                .await
            })
        });
        self.queues.enqueue(QueuedJob { control: job, run })?;
        Ok(id)
    }

    /// Enqueue an export of a selection into an artifact file.
    pub fn enqueue_export(
        &self,
        selection: ExportSelection,
        format: ExportFormat,
        user: &str,
    ) -> Result<JobId> {
        let job = Arc::new(Job::<ExportProgress>::new(JobKind::Export, user));
        let id = job.id();
        let progress = Arc::clone(&job.progress);
        let cancel = job.cancel_token();
        self.registry.insert(Arc::clone(&job) as Arc<dyn JobControl>);

        let archive = Arc::clone(&self.archive);
        let access_log = Arc::clone(&self.access_log);
        let artifact_dir = self.config.artifact_dir.clone();
        let user = user.to_string();
        let run = Box::new(move || -> BoxFuture<'static, Result<JobOutcome>> {
            Box::pin(async move {
                export::run_export(
                    &archive,
                    &access_log,
                    &artifact_dir,
                    &selection,
                    format,
                    id,
                    &user,
                    &progress,
                    &cancel,
                )
                .await
            })
        });
        self.queues.enqueue(QueuedJob { control: job, run })?;
        Ok(id)
    }

    /// Enqueue deletion of an account and its archived emails.
    ///
    /// Locked rows are never deleted; when any exist the account stays in
    /// place and the job ends `CompletedWithErrors`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] for an unknown account.
    pub async fn enqueue_account_deletion(
        &self,
        account_id: MailAccountId,
        user: &str,
    ) -> Result<JobId> {
        let account = self.accounts.get_required(account_id).await?;

        let job = Arc::new(Job::<DeletionProgress>::new(JobKind::AccountDeletion, user));
        let id = job.id();
        let progress = Arc::clone(&job.progress);
        let cancel = job.cancel_token();
        self.registry.insert(Arc::clone(&job) as Arc<dyn JobControl>);

        let accounts = Arc::clone(&self.accounts);
        let archive = Arc::clone(&self.archive);
        let access_log = Arc::clone(&self.access_log);
        let user = user.to_string();
        let run = Box::new(move || -> BoxFuture<'static, Result<JobOutcome>> {
            Box::pin(async move {
                let ids = archive.list_ids_for_account(account_id).await?;
                let failed =
                    delete_emails(&archive, &ids, &progress, &cancel).await?;

                let outcome = if failed == 0 {
                    accounts.delete(account_id).await?;
                    JobOutcome::Clean
                } else {
                    warn!(
                        account = %account.name,
                        locked = failed,
                        "account kept, locked emails remain"
                    );
                    JobOutcome::WithErrors
                };

                access_log
                    .log(
                        &user,
                        AccessType::Account,
                        &format!(
                            "deleted account {} ({} emails removed, {} kept)",
                            account.name,
                            progress.deleted.load(Ordering::Relaxed),
                            failed
                        ),
                    )
                    .await?;
                Ok(outcome)
            })
        });
        self.queues.enqueue(QueuedJob { control: job, run })?;
        Ok(id)
    }

    /// Enqueue deletion of a selection of archived emails.
    ///
    /// Locked rows fail their item and are reported through the job's
    /// counters.
    pub fn enqueue_email_deletion(&self, ids: Vec<ArchivedEmailId>, user: &str) -> Result<JobId> {
        let job = Arc::new(Job::<DeletionProgress>::new(JobKind::EmailDeletion, user));
        let id = job.id();
        let progress = Arc::clone(&job.progress);
        let cancel = job.cancel_token();
        self.registry.insert(Arc::clone(&job) as Arc<dyn JobControl>);

        let archive = Arc::clone(&self.archive);
        let access_log = Arc::clone(&self.access_log);
        let user = user.to_string();
        let run = Box::new(move || -> BoxFuture<'static, Result<JobOutcome>> {
            Box::pin(async move {
                let failed = delete_emails(&archive, &ids, &progress, &cancel).await?;
                access_log
                    .log(
                        &user,
                        AccessType::Deletion,
                        &format!(
                            "deleted {} emails ({} failed)",
                            progress.deleted.load(Ordering::Relaxed),
                            failed
                        ),
                    )
                    .await?;
                Ok(if failed == 0 {
                    JobOutcome::Clean
                } else {
                    JobOutcome::WithErrors
                })
            })
        });
        self.queues.enqueue(QueuedJob { control: job, run })?;
        Ok(id)
    }

    /// Point-in-time view of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for an unknown id.
    pub fn get_job_status(&self, id: JobId) -> Result<JobSnapshot> {
        self.registry.snapshot(id)
    }

    /// Request cooperative cancellation of a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for an unknown id.
    pub fn cancel_job(&self, id: JobId) -> Result<()> {
        self.registry.cancel(id)
    }

    /// Mark a finished export as fetched by the user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] for an unknown id and
    /// [`Error::Unsupported`] when the job is not a finished export.
    pub fn mark_downloaded(&self, id: JobId) -> Result<()> {
        self.registry.mark_downloaded(id)
    }

    /// Every job a user enqueued, newest first.
    #[must_use]
    pub fn jobs_for_user(&self, user: &str) -> Vec<JobSnapshot> {
        self.registry.snapshots_for_user(user)
    }

    /// Verify an account's credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`], [`Error::Connection`] on bad
    /// credentials, or [`Error::Unsupported`] for import accounts.
    pub async fn test_connection(&self, account_id: MailAccountId) -> Result<()> {
        let account = self.accounts.get_required(account_id).await?;
        self.factory
            .resolve(account.provider)
            .test_connection(&account)
            .await
    }

    /// Folders of an account's remote mailbox.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::test_connection`].
    pub async fn list_folders(&self, account_id: MailAccountId) -> Result<Vec<String>> {
        let account = self.accounts.get_required(account_id).await?;
        self.factory
            .resolve(account.provider)
            .list_folders(&account)
            .await
    }

    /// Total message count across an account's remote mailbox.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::test_connection`].
    pub async fn count_emails(&self, account_id: MailAccountId) -> Result<u64> {
        let account = self.accounts.get_required(account_id).await?;
        self.factory
            .resolve(account.provider)
            .count_emails(&account)
            .await
    }
}

/// Delete a selection of emails, counting locked and failed rows.
/// Returns the failure count.
async fn delete_emails(
    archive: &ArchiveRepository,
    ids: &[ArchivedEmailId],
    progress: &DeletionProgress,
    cancel: &CancellationToken,
) -> Result<u64> {
    progress.total.store(ids.len() as u64, Ordering::Relaxed);

    let mut failed = 0;
    for &id in ids {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match archive.delete(id).await {
            Ok(()) => {
                progress.deleted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(email_id = id.0, error = %e, "email deletion failed");
                progress.failed.fetch_add(1, Ordering::Relaxed);
                failed += 1;
            }
        }
    }
    Ok(failed)
}
