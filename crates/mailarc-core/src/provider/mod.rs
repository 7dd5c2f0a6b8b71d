//! Provider services: one implementation per mail source.
//!
//! Each service pairs a [`TransportConnector`] with the shared sync
//! engine; callers resolve a service through the factory and only ever
//! see the [`ProviderEmailService`] trait.

mod factory;
mod graph;
mod imap;
mod import;
mod sync;
mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

pub use factory::ProviderServiceFactory;
pub use graph::GraphEmailService;
pub use imap::ImapEmailService;
pub use import::ImportEmailService;
pub use sync::ProviderEngine;
pub use transport::{FetchedMessage, MailTransport, TransportConnector};

use crate::Result;
use crate::account::{MailAccount, ProviderType};
use crate::archive::ArchivedEmailId;
use crate::job::{RestoreProgress, SyncProgress};

/// Result of one sync run over an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Folders scanned.
    pub folders: u64,
    /// Messages seen (new or already archived).
    pub processed: u64,
    /// Messages newly archived.
    pub archived: u64,
    /// Messages that failed to parse or store.
    pub failed: u64,
    /// Remote messages removed by server retention.
    pub server_deleted: u64,
    /// Archived rows removed by local retention.
    pub local_deleted: u64,
}

/// Common contract every provider service fulfils completely.
///
/// There is no partially capable implementation; providers that cannot
/// support an operation (local import) return
/// [`Error::Unsupported`](crate::Error::Unsupported) explicitly.
#[async_trait]
pub trait ProviderEmailService: Send + Sync + std::fmt::Debug {
    /// Which provider this service talks to.
    fn provider_type(&self) -> ProviderType;

    /// Incremental sync from the account's `last_sync` point.
    async fn sync_account(
        &self,
        account: &MailAccount,
        progress: Option<Arc<SyncProgress>>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport>;

    /// Full sync from the beginning of time, ignoring `last_sync`.
    async fn resync_account(
        &self,
        account: &MailAccount,
        progress: Option<Arc<SyncProgress>>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport>;

    /// Verify credentials by opening and closing a connection.
    async fn test_connection(&self, account: &MailAccount) -> Result<()>;

    /// Selectable folders of the remote mailbox.
    async fn list_folders(&self, account: &MailAccount) -> Result<Vec<String>>;

    /// Upload one archived email back into a mailbox folder.
    async fn restore_to_folder(
        &self,
        email_id: ArchivedEmailId,
        account: &MailAccount,
        folder: &str,
    ) -> Result<()>;

    /// Upload a batch of archived emails, reporting progress and honoring
    /// cancellation between items. Returns `(succeeded, failed)`.
    async fn restore_many_with_progress(
        &self,
        ids: &[ArchivedEmailId],
        account: &MailAccount,
        folder: &str,
        progress: Option<Arc<RestoreProgress>>,
        cancel: &CancellationToken,
    ) -> Result<(u64, u64)>;

    /// Total message count across the remote mailbox's folders.
    async fn count_emails(&self, account: &MailAccount) -> Result<u64>;
}
