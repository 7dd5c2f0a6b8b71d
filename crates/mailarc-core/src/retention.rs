//! Server and local retention passes.
//!
//! Validation guarantees `local_retention_days` implies
//! `delete_after_days` and is never shorter, so a message always leaves
//! the mailbox before (or at the same age as) it leaves the archive.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::Result;
use crate::account::MailAccount;
use crate::archive::ArchiveRepository;
use crate::provider::MailTransport;

/// Turns account retention settings into cutoffs and applies them.
pub struct RetentionEvaluator;

impl RetentionEvaluator {
    /// Cutoff for deleting remote messages, when server retention is on.
    #[must_use]
    pub fn server_cutoff(account: &MailAccount) -> Option<DateTime<Utc>> {
        account
            .delete_after_days
            .map(|days| Utc::now() - Duration::days(i64::from(days)))
    }

    /// Cutoff for deleting archived rows, when local retention is on.
    #[must_use]
    pub fn local_cutoff(account: &MailAccount) -> Option<DateTime<Utc>> {
        account
            .local_retention_days
            .map(|days| Utc::now() - Duration::days(i64::from(days)))
    }

    /// Delete remote messages older than the server cutoff in every
    /// non-excluded folder. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error when listing folders or deleting fails.
    pub async fn apply_server_retention(
        transport: &mut dyn MailTransport,
        account: &MailAccount,
    ) -> Result<u64> {
        let Some(cutoff) = Self::server_cutoff(account) else {
            return Ok(0);
        };

        let mut total = 0;
        for folder in transport.list_folders().await? {
            if account.is_folder_excluded(&folder) {
                debug!(folder, "excluded from server retention");
                continue;
            }
            total += transport.delete_older_than(&folder, cutoff).await?;
        }

        if total > 0 {
            info!(account = %account.name, deleted = total, "server retention pass");
        }
        Ok(total)
    }

    /// Delete unlocked archived rows older than the local cutoff.
    /// Locked rows are always kept. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error when the archive delete fails.
    pub async fn apply_local_retention(
        archive: &ArchiveRepository,
        account: &MailAccount,
    ) -> Result<u64> {
        let Some(cutoff) = Self::local_cutoff(account) else {
            return Ok(0);
        };
        let Some(account_id) = account.id else {
            return Ok(0);
        };

        let deleted = archive.delete_older_than(account_id, cutoff).await?;
        if deleted > 0 {
            info!(account = %account.name, deleted, "local retention pass");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::ProviderType;
    use crate::provider::FetchedMessage;
    use async_trait::async_trait;

    struct FakeTransport {
        folders: Vec<String>,
        deleted_from: Vec<String>,
    }

    #[async_trait]
    impl MailTransport for FakeTransport {
        async fn list_folders(&mut self) -> Result<Vec<String>> {
            Ok(self.folders.clone())
        }

        async fn fetch_since(
            &mut self,
            _folder: &str,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<FetchedMessage>> {
            Ok(Vec::new())
        }

        async fn append(&mut self, _folder: &str, _raw: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn delete_older_than(
            &mut self,
            folder: &str,
            _cutoff: DateTime<Utc>,
        ) -> Result<u64> {
            self.deleted_from.push(folder.to_string());
            Ok(2)
        }

        async fn count(&mut self, _folder: &str) -> Result<u64> {
            Ok(0)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn account_with_retention(delete_after: Option<u32>) -> MailAccount {
        let mut account = MailAccount::new("Work", "alice", ProviderType::Imap);
        account.delete_after_days = delete_after;
        account
    }

    #[test]
    fn no_setting_means_no_cutoff() {
        let account = account_with_retention(None);
        assert!(RetentionEvaluator::server_cutoff(&account).is_none());
        assert!(RetentionEvaluator::local_cutoff(&account).is_none());
    }

    #[test]
    fn cutoff_is_days_in_the_past() {
        let account = account_with_retention(Some(30));
        let cutoff = RetentionEvaluator::server_cutoff(&account).unwrap();
        let age = Utc::now() - cutoff;
        assert!(age >= Duration::days(30));
        assert!(age < Duration::days(30) + Duration::seconds(5));
    }

    #[tokio::test]
    async fn server_retention_skips_excluded_folders() {
        let mut account = account_with_retention(Some(30));
        account.excluded_folders = vec!["Drafts".into()];

        let mut transport = FakeTransport {
            folders: vec!["INBOX".into(), "Drafts".into(), "Sent".into()],
            deleted_from: Vec::new(),
        };

        let deleted = RetentionEvaluator::apply_server_retention(&mut transport, &account)
            .await
            .unwrap();
        assert_eq!(deleted, 4);
        assert_eq!(transport.deleted_from, vec!["INBOX", "Sent"]);
    }

    #[tokio::test]
    async fn server_retention_without_setting_touches_nothing() {
        let account = account_with_retention(None);
        let mut transport = FakeTransport {
            folders: vec!["INBOX".into()],
            deleted_from: Vec::new(),
        };

        let deleted = RetentionEvaluator::apply_server_retention(&mut transport, &account)
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        assert!(transport.deleted_from.is_empty());
    }
}
