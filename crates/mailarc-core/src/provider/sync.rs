//! Shared provider engine: folder walk, restore batches, counting.
//!
//! IMAP and Graph differ only in how a transport gets connected; every
//! step after `connect` is identical and lives here.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::transport::TransportConnector;
use super::SyncReport;
use crate::accesslog::{AccessLogRepository, AccessType};
use crate::account::{AccountRepository, MailAccount};
use crate::archive::{parse_email, ArchiveRepository, ArchivedEmailId};
use crate::codec::eml;
use crate::job::{Pacer, PacingConfig, RestoreProgress, SyncProgress};
use crate::retention::RetentionEvaluator;
use crate::{Error, Result};

/// Repositories and pacing shared by every remote provider service.
///
/// Public so alternative [`TransportConnector`] implementations (tests
/// included) can drive the same folder walk the built-in services use.
#[derive(Debug)]
pub struct ProviderEngine {
    accounts: Arc<AccountRepository>,
    archive: Arc<ArchiveRepository>,
    access_log: Arc<AccessLogRepository>,
    pacing: PacingConfig,
}

impl ProviderEngine {
    /// Build an engine over the shared repositories.
    #[must_use]
    pub fn new(
        accounts: Arc<AccountRepository>,
        archive: Arc<ArchiveRepository>,
        access_log: Arc<AccessLogRepository>,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            accounts,
            archive,
            access_log,
            pacing,
        }
    }

    /// Run one sync over an account.
    ///
    /// `last_sync` only advances after every folder completed; a failed
    /// or cancelled run therefore re-scans the same window next time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the connector fails,
    /// [`Error::Cancelled`] when the token trips, and transport or
    /// storage errors otherwise.
    pub async fn sync(
        &self,
        connector: &dyn TransportConnector,
        account: &MailAccount,
        force_full: bool,
        progress: Option<&SyncProgress>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let account_id = account.id.ok_or(Error::AccountNotFound(0))?;
        let mut transport = connector.connect(account).await?;
        let mut report = SyncReport::default();

        let folders: Vec<String> = transport
            .list_folders()
            .await?
            .into_iter()
            .filter(|folder| !account.is_folder_excluded(folder))
            .collect();
        if let Some(p) = progress {
            p.folders_total
                .store(folders.len() as u64, Ordering::Relaxed);
        }

        let since = if force_full || account.always_full_sync {
            None
        } else {
            account.last_sync
        };

        let mut pacer = Pacer::new(self.pacing.clone());
        for folder in &folders {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            debug!(folder, ?since, "scanning folder");

            let messages = transport.fetch_since(folder, since).await?;
            for message in messages {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                pacer.pace().await;

                report.processed += 1;
                if let Some(p) = progress {
                    p.processed_emails.fetch_add(1, Ordering::Relaxed);
                }

                // Fast path: trust the provider-reported Message-ID for
                // the dedup check before paying for a parse.
                if let Some(id) = normalize_message_id(message.message_id.as_deref()) {
                    if self.archive.exists(account_id, &id).await? {
                        continue;
                    }
                }

                let parsed = match parse_email(&message.raw) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!(folder, error = %e, "skipping unparseable message");
                        report.failed += 1;
                        if let Some(p) = progress {
                            p.failed_emails.fetch_add(1, Ordering::Relaxed);
                        }
                        continue;
                    }
                };

                if self
                    .archive
                    .exists(account_id, &parsed.dedup_message_id())
                    .await?
                {
                    continue;
                }

                let (mut email, attachments) =
                    parsed.into_archived(account_id, folder, message.received_at, &message.raw);
                match self.archive.insert(&mut email, &attachments).await {
                    Ok(_) => {
                        report.archived += 1;
                        if let Some(p) = progress {
                            p.new_emails.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        warn!(folder, error = %e, "failed to store message");
                        report.failed += 1;
                        if let Some(p) = progress {
                            p.failed_emails.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }

            report.folders += 1;
            if let Some(p) = progress {
                p.folders_processed.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.accounts
            .set_last_sync(account_id, chrono::Utc::now())
            .await?;

        report.server_deleted =
            RetentionEvaluator::apply_server_retention(transport.as_mut(), account).await?;
        if account.delete_after_days.is_some() {
            self.access_log
                .log(
                    &account.user_id,
                    AccessType::Deletion,
                    &format!(
                        "server retention removed {} emails from {}",
                        report.server_deleted, account.name
                    ),
                )
                .await?;
        }

        report.local_deleted =
            RetentionEvaluator::apply_local_retention(&self.archive, account).await?;
        if account.local_retention_days.is_some() {
            self.access_log
                .log(
                    &account.user_id,
                    AccessType::Deletion,
                    &format!(
                        "local retention removed {} emails from {}",
                        report.local_deleted, account.name
                    ),
                )
                .await?;
        }

        transport.close().await?;
        info!(
            account = %account.name,
            folders = report.folders,
            processed = report.processed,
            archived = report.archived,
            failed = report.failed,
            "sync finished"
        );
        Ok(report)
    }

    /// Upload one archived email into a mailbox folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotFound`] for an unknown id and transport
    /// errors from the upload.
    pub async fn restore_one(
        &self,
        connector: &dyn TransportConnector,
        email_id: ArchivedEmailId,
        account: &MailAccount,
        folder: &str,
    ) -> Result<()> {
        let raw = self.restorable_bytes(email_id).await?;
        let mut transport = connector.connect(account).await?;
        transport.append(folder, &raw).await?;
        transport.close().await?;
        Ok(())
    }

    /// Upload a batch of archived emails. Per-item failures are counted,
    /// never propagated; cancellation stops between items with the counts
    /// accumulated so far.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] when the connector fails.
    pub async fn restore_many(
        &self,
        connector: &dyn TransportConnector,
        ids: &[ArchivedEmailId],
        account: &MailAccount,
        folder: &str,
        progress: Option<&RestoreProgress>,
        cancel: &CancellationToken,
    ) -> Result<(u64, u64)> {
        if let Some(p) = progress {
            p.total.store(ids.len() as u64, Ordering::Relaxed);
        }

        let mut transport = connector.connect(account).await?;
        let mut pacer = Pacer::new(self.pacing.clone());
        let mut succeeded = 0u64;
        let mut failed = 0u64;

        for &id in ids {
            if cancel.is_cancelled() {
                break;
            }
            pacer.pace().await;

            let outcome = match self.restorable_bytes(id).await {
                Ok(raw) => transport.append(folder, &raw).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    succeeded += 1;
                    if let Some(p) = progress {
                        p.succeeded.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    warn!(email_id = id.0, error = %e, "restore failed for email");
                    failed += 1;
                    if let Some(p) = progress {
                        p.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            if let Some(p) = progress {
                p.processed.fetch_add(1, Ordering::Relaxed);
            }
        }

        transport.close().await?;
        self.access_log
            .log(
                &account.user_id,
                AccessType::Restore,
                &format!(
                    "restored {succeeded} emails to {}/{folder} ({failed} failed)",
                    account.name
                ),
            )
            .await?;
        Ok((succeeded, failed))
    }

    /// Total message count across the mailbox's non-excluded folders.
    ///
    /// # Errors
    ///
    /// Returns connection or transport errors.
    pub async fn count_emails(
        &self,
        connector: &dyn TransportConnector,
        account: &MailAccount,
    ) -> Result<u64> {
        let mut transport = connector.connect(account).await?;
        let mut total = 0;
        for folder in transport.list_folders().await? {
            if account.is_folder_excluded(&folder) {
                continue;
            }
            total += transport.count(&folder).await?;
        }
        transport.close().await?;
        Ok(total)
    }

    /// Open and immediately close a connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] on bad credentials or an
    /// unreachable server.
    pub async fn test_connection(
        &self,
        connector: &dyn TransportConnector,
        account: &MailAccount,
    ) -> Result<()> {
        let mut transport = connector.connect(account).await?;
        transport.close().await
    }

    /// List the mailbox's folders, exclusions not applied.
    ///
    /// # Errors
    ///
    /// Returns connection or transport errors.
    pub async fn list_folders(
        &self,
        connector: &dyn TransportConnector,
        account: &MailAccount,
    ) -> Result<Vec<String>> {
        let mut transport = connector.connect(account).await?;
        let folders = transport.list_folders().await?;
        transport.close().await?;
        Ok(folders)
    }

    /// RFC822 bytes for restore: the stored raw copy when present, else a
    /// rebuild from the structured fields.
    async fn restorable_bytes(&self, id: ArchivedEmailId) -> Result<Vec<u8>> {
        let email = self.archive.get_required(id).await?;
        if let Some(raw) = &email.body_raw {
            return Ok(raw.clone());
        }
        let attachments = self.archive.attachments(id).await?;
        eml::encode(&email, &attachments)
    }
}

/// Strip angle brackets and whitespace from a provider-reported
/// Message-ID so it matches the parsed form.
fn normalize_message_id(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim().trim_start_matches('<').trim_end_matches('>');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_normalization() {
        assert_eq!(
            normalize_message_id(Some(" <abc@example.com> ")),
            Some("abc@example.com".to_string())
        );
        assert_eq!(
            normalize_message_id(Some("abc@example.com")),
            Some("abc@example.com".to_string())
        );
        assert_eq!(normalize_message_id(Some("  ")), None);
        assert_eq!(normalize_message_id(Some("<>")), None);
        assert_eq!(normalize_message_id(None), None);
    }
}
