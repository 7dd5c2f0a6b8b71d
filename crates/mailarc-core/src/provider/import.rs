//! Placeholder service for import-only accounts.
//!
//! Import accounts have no remote mailbox. They still resolve to a fully
//! shaped service so callers never hold a partially capable object; every
//! operation answers `Unsupported` with the operation name.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ProviderEmailService, SyncReport};
use crate::account::{MailAccount, ProviderType};
use crate::archive::ArchivedEmailId;
use crate::job::{RestoreProgress, SyncProgress};
use crate::{Error, Result};

/// Provider service for local-import accounts.
#[derive(Debug)]
pub struct ImportEmailService;

#[async_trait]
impl ProviderEmailService for ImportEmailService {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Import
    }

    async fn sync_account(
        &self,
        _account: &MailAccount,
        _progress: Option<Arc<SyncProgress>>,
        _cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        Err(Error::Unsupported("sync_account on an import account"))
    }

    async fn resync_account(
        &self,
        _account: &MailAccount,
        _progress: Option<Arc<SyncProgress>>,
        _cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        Err(Error::Unsupported("resync_account on an import account"))
    }

    async fn test_connection(&self, _account: &MailAccount) -> Result<()> {
        Err(Error::Unsupported("test_connection on an import account"))
    }

    async fn list_folders(&self, _account: &MailAccount) -> Result<Vec<String>> {
        Err(Error::Unsupported("list_folders on an import account"))
    }

    async fn restore_to_folder(
        &self,
        _email_id: ArchivedEmailId,
        _account: &MailAccount,
        _folder: &str,
    ) -> Result<()> {
        Err(Error::Unsupported("restore_to_folder on an import account"))
    }

    async fn restore_many_with_progress(
        &self,
        _ids: &[ArchivedEmailId],
        _account: &MailAccount,
        _folder: &str,
        _progress: Option<Arc<RestoreProgress>>,
        _cancel: &CancellationToken,
    ) -> Result<(u64, u64)> {
        Err(Error::Unsupported(
            "restore_many_with_progress on an import account",
        ))
    }

    async fn count_emails(&self, _account: &MailAccount) -> Result<u64> {
        Err(Error::Unsupported("count_emails on an import account"))
    }
}
