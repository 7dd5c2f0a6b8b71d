//! Provider-neutral mailbox transport.
//!
//! The sync engine and retention only ever talk to these traits; the
//! IMAP and Graph crates stay behind the connectors in `imap.rs` and
//! `graph.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::account::MailAccount;

/// One raw message pulled from a mailbox.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    /// Provider-reported RFC822 Message-ID, when the provider exposes one.
    pub message_id: Option<String>,
    /// Full RFC822 bytes.
    pub raw: Vec<u8>,
    /// Provider-reported delivery time.
    pub received_at: Option<DateTime<Utc>>,
}

/// A connected mailbox, independent of the wire protocol behind it.
#[async_trait]
pub trait MailTransport: Send {
    /// Selectable folder names.
    async fn list_folders(&mut self) -> Result<Vec<String>>;

    /// Fetch every message in a folder received at or after `since`;
    /// `None` scans from the beginning of time.
    async fn fetch_since(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FetchedMessage>>;

    /// Upload a raw message into a folder.
    async fn append(&mut self, folder: &str, raw: &[u8]) -> Result<()>;

    /// Permanently delete messages older than `cutoff`. Returns how many
    /// were removed.
    async fn delete_older_than(&mut self, folder: &str, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Number of messages in a folder.
    async fn count(&mut self, folder: &str) -> Result<u64>;

    /// Shut the connection down.
    async fn close(&mut self) -> Result<()>;
}

/// Builds a connected [`MailTransport`] from account credentials.
///
/// A connect failure is job-fatal: callers map it to
/// [`Error::Connection`](crate::Error::Connection) and never advance
/// `last_sync`.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Open a transport for the account.
    async fn connect(&self, account: &MailAccount) -> Result<Box<dyn MailTransport>>;
}
