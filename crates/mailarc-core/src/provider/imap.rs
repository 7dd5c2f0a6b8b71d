//! IMAP-backed provider service.

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

use mailarc_imap::{ImapConfig, ImapSession};

/// Opens TLS IMAP sessions from account credentials.
#[derive(Debug)]
pub(super) struct ImapConnector;

#[async_trait]
impl TransportConnector for ImapConnector {
    async fn connect(&self, account: &MailAccount) -> Result<Box<dyn MailTransport>> {
        let settings = account
            .imap
            .as_ref()
            .ok_or_else(|| Error::Connection("account has no IMAP settings".to_string()))?;

        let config = ImapConfig {
            host: settings.server.clone(),
            port: settings.port,
            username: settings.username.clone(),
            password: settings.password.clone(),
        };
        let session = mailarc_imap::connect(&config)
            .await
            .map_err(|e| Error::Connection(format!("IMAP connect to {}: {e}", settings.server)))?;
        debug!(server = %settings.server, "IMAP session opened");

        Ok(Box::new(ImapTransport {
            session: Some(session),
        }))
    }
}

struct ImapTransport {
    session: Option<ImapSession>,
}

impl ImapTransport {
    fn session(&mut self) -> Result<&mut ImapSession> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Connection("IMAP session already closed".to_string()))
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    async fn list_folders(&mut self) -> Result<Vec<String>> {
        Ok(self.session()?.list_folders().await?)
    }

    async fn fetch_since(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FetchedMessage>> {
        let session = self.session()?;
        let uids = session.search_since(folder, since).await?;

        let mut messages = Vec::with_capacity(uids.len());
        for uid in uids {
            let raw = session.fetch_raw(uid).await?;
            messages.push(FetchedMessage {
                message_id: None,
                raw: raw.body,
                received_at: raw.internal_date,
            });
        }
        Ok(messages)
    }

    async fn append(&mut self, folder: &str, raw: &[u8]) -> Result<()> {
        Ok(self.session()?.append(folder, raw).await?)
    }

    async fn delete_older_than(&mut self, folder: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(self.session()?.delete_before(folder, cutoff).await?)
    }

    async fn count(&mut self, folder: &str) -> Result<u64> {
        Ok(u64::from(self.session()?.count(folder).await?))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        Ok(())
    }
}

/// Provider service for generic IMAP accounts.
#[derive(Debug)]
pub struct ImapEmailService {
    core: ProviderEngine,
    connector: ImapConnector,
}

impl ImapEmailService {
    pub(super) fn new(core: ProviderEngine) -> Self {
        Self {
            core,
            connector: ImapConnector,
        }
    }
}

#[async_trait]
impl ProviderEmailService for ImapEmailService {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Imap
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
