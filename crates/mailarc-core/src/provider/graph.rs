//! Microsoft 365 provider service via the Graph API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::sync::ProviderEngine;
use super::transport::{FetchedMessage, MailTransport, TransportConnector};
use super::{ProviderEmailService, SyncReport};
use crate::account::{MailAccount, ProviderType};
use crate::archive::ArchivedEmailId;
use crate::job::{RestoreProgress, SyncProgress};
use crate::{Error, Result};

use mailarc_graph::{GraphClient, GraphConfig, MailFolder};

/// Builds authenticated Graph clients from account credentials.
#[derive(Debug)]
pub(super) struct GraphConnector;

#[async_trait]
impl TransportConnector for GraphConnector {
    async fn connect(&self, account: &MailAccount) -> Result<Box<dyn MailTransport>> {
        let settings = account
            .graph
            .as_ref()
            .ok_or_else(|| Error::Connection("account has no Graph settings".to_string()))?;

        let client = GraphClient::new(GraphConfig {
            tenant_id: settings.tenant_id.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            user: settings.mailbox.clone(),
        });

        // Probe the mailbox up front so bad credentials fail the job
        // before any folder work starts, same as an IMAP login failure.
        let folders = client
            .list_mail_folders()
            .await
            .map_err(|e| Error::Connection(format!("Graph connect for {}: {e}", settings.mailbox)))?;
        debug!(mailbox = %settings.mailbox, folders = folders.len(), "graph client connected");

        Ok(Box::new(GraphTransport { client, folders }))
    }
}

/// Graph names folders by opaque ids; the transport keeps the directory
/// fetched at connect time and resolves display names against it.
struct GraphTransport {
    client: GraphClient,
    folders: Vec<MailFolder>,
}

impl GraphTransport {
    fn folder_id(&self, name: &str) -> Result<&str> {
        self.folders
            .iter()
            .find(|f| f.display_name.eq_ignore_ascii_case(name))
            .map(|f| f.id.as_str())
            .ok_or_else(|| Error::Connection(format!("unknown Graph folder {name:?}")))
    }
}

#[async_trait]
impl MailTransport for GraphTransport {
    async fn list_folders(&mut self) -> Result<Vec<String>> {
        Ok(self
            .folders
            .iter()
            .map(|f| f.display_name.clone())
            .collect())
    }

    async fn fetch_since(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FetchedMessage>> {
        let folder_id = self.folder_id(folder)?.to_string();
        let metas = self.client.list_messages_since(&folder_id, since).await?;

        let mut messages = Vec::with_capacity(metas.len());
        for meta in metas {
            let raw = self.client.get_mime(&meta.id).await?;
            messages.push(FetchedMessage {
                message_id: meta.internet_message_id,
                raw,
                received_at: Some(meta.received_date_time),
            });
        }
        Ok(messages)
    }

    async fn append(&mut self, folder: &str, raw: &[u8]) -> Result<()> {
        let folder_id = self.folder_id(folder)?.to_string();
        Ok(self.client.upload_mime(&folder_id, raw).await?)
    }

    async fn delete_older_than(&mut self, folder: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let folder_id = self.folder_id(folder)?.to_string();
        let expired = self.client.list_messages_before(&folder_id, cutoff).await?;

        let mut deleted = 0;
        for meta in expired {
            self.client.delete_message(&meta.id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    async fn count(&mut self, folder: &str) -> Result<u64> {
        let entry = self
            .folders
            .iter()
            .find(|f| f.display_name.eq_ignore_ascii_case(folder))
            .ok_or_else(|| Error::Connection(format!("unknown Graph folder {folder:?}")))?;
        Ok(entry.total_item_count.unwrap_or_default())
    }

    async fn close(&mut self) -> Result<()> {
        // Nothing to tear down; the client is a stateless HTTP handle.
        Ok(())
    }
}

/// Provider service for Microsoft 365 mailboxes.
#[derive(Debug)]
pub struct GraphEmailService {
    core: ProviderEngine,
    connector: GraphConnector,
}

impl GraphEmailService {
    pub(super) fn new(core: ProviderEngine) -> Self {
        Self {
            core,
            connector: GraphConnector,
        }
    }
}

#[async_trait]
impl ProviderEmailService for GraphEmailService {
    fn provider_type(&self) -> ProviderType {
        ProviderType::M365
    }

    async fn sync_account(
        &self,
        account: &MailAccount,
        progress: Option<Arc<SyncProgress>>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        self.core
            .sync(&self.connector, account, false, progress.as_deref(), cancel)
            .await
    }

    async fn resync_account(
        &self,
        account: &MailAccount,
        progress: Option<Arc<SyncProgress>>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        self.core
            .sync(&self.connector, account, true, progress.as_deref(), cancel)
            .await
    }

    async fn test_connection(&self, account: &MailAccount) -> Result<()> {
        self.core.test_connection(&self.connector, account).await
    }

    async fn list_folders(&self, account: &MailAccount) -> Result<Vec<String>> {
        self.core.list_folders(&self.connector, account).await
    }

    async fn restore_to_folder(
        &self,
        email_id: ArchivedEmailId,
        account: &MailAccount,
        folder: &str,
    ) -> Result<()> {
        self.core
            .restore_one(&self.connector, email_id, account, folder)
            .await
    }

    async fn restore_many_with_progress(
        &self,
        ids: &[ArchivedEmailId],
        account: &MailAccount,
        folder: &str,
        progress: Option<Arc<RestoreProgress>>,
        cancel: &CancellationToken,
    ) -> Result<(u64, u64)> {
        self.core
            .restore_many(
                &self.connector,
                ids,
                account,
                folder,
                progress.as_deref(),
                cancel,
            )
            .await
    }

    async fn count_emails(&self, account: &MailAccount) -> Result<u64> {
        self.core.count_emails(&self.connector, account).await
    }
}
