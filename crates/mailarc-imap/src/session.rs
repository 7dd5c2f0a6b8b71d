//! Authenticated IMAP session wrapper.

use std::sync::Arc;
use std::time::Duration;

use async_imap::types::NameAttribute;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

use crate::config::ImapConfig;
use crate::error::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A raw message fetched from the server.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Server-assigned UID within the selected folder.
    pub uid: u32,
    /// Full RFC822 message bytes.
    pub body: Vec<u8>,
    /// Server INTERNALDATE, when present.
    pub internal_date: Option<DateTime<Utc>>,
}

type InnerSession = async_imap::Session<TlsStream<TcpStream>>;

/// Authenticated IMAP session.
///
/// Tracks which folder is currently selected so repeated operations on the
/// same folder skip redundant SELECT round-trips.
pub struct ImapSession {
    inner: InnerSession,
    selected: Option<String>,
}

/// Connect over implicit TLS and authenticate with LOGIN.
///
/// # Errors
///
/// Returns an error if the TCP/TLS handshake, greeting, or login fails.
pub async fn connect(config: &ImapConfig) -> Result<ImapSession> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let tcp = tokio::time::timeout(
        CONNECT_TIMEOUT,
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| Error::Timeout(CONNECT_TIMEOUT))??;

    let server_name = ServerName::try_from(config.host.clone())?;
    let tls = connector.connect(server_name, tcp).await?;

    let client = async_imap::Client::new(tls);
    debug!(host = %config.host, "TLS established, authenticating");

    let inner = client
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| Error::Auth(e.to_string()))?;

    Ok(ImapSession {
        inner,
        selected: None,
    })
}

impl ImapSession {
    /// List selectable folders.
    ///
    /// # Errors
    ///
    /// Returns an error if the LIST command fails.
    pub async fn list_folders(&mut self) -> Result<Vec<String>> {
        let names: Vec<_> = self
            .inner
            .list(Some(""), Some("*"))
            .await?
            .try_collect()
            .await?;

        let folders = names
            .iter()
            .filter(|name| {
                !name
                    .attributes()
                    .iter()
                    .any(|attr| matches!(attr, NameAttribute::NoSelect))
            })
            .map(|name| name.name().to_string())
            .collect();

        Ok(folders)
    }

    /// Search a folder for message UIDs received since the given instant.
    ///
    /// `None` searches the whole folder. UIDs come back in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if SELECT or SEARCH fails.
    pub async fn search_since(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<u32>> {
        self.select(folder).await?;

        let query = since.map_or_else(
            || "ALL".to_string(),
            |ts| format!("SINCE {}", ts.format("%d-%b-%Y")),
        );
        let uids = self.inner.uid_search(&query).await?;

        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    /// Fetch the full raw message for a UID in the currently selected folder.
    ///
    /// # Errors
    ///
    /// Returns an error if FETCH fails or the response carries no body.
    pub async fn fetch_raw(&mut self, uid: u32) -> Result<RawMessage> {
        let fetches: Vec<_> = self
            .inner
            .uid_fetch(uid.to_string(), "(UID INTERNALDATE BODY.PEEK[])")
            .await?
            .try_collect()
            .await?;

        let fetch = fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .ok_or(Error::MissingData("FETCH response for UID"))?;
        let body = fetch.body().ok_or(Error::MissingData("message body"))?;

        Ok(RawMessage {
            uid,
            body: body.to_vec(),
            internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
        })
    }

    /// Append a raw RFC822 message to a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if APPEND fails.
    pub async fn append(&mut self, folder: &str, raw: &[u8]) -> Result<()> {
        self.inner.append(folder, None, None, raw).await?;
        Ok(())
    }

    /// Delete and expunge all messages in a folder older than `cutoff`.
    ///
    /// Returns the number of messages removed.
    ///
    /// # Errors
    ///
    /// Returns an error if SELECT, SEARCH, STORE, or EXPUNGE fails.
    pub async fn delete_before(&mut self, folder: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        self.select(folder).await?;

        let query = format!("BEFORE {}", cutoff.format("%d-%b-%Y"));
        let uids = self.inner.uid_search(&query).await?;
        if uids.is_empty() {
            return Ok(0);
        }

        let mut sorted: Vec<u32> = uids.into_iter().collect();
        sorted.sort_unstable();
        let uid_set = sorted
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let updates: Vec<_> = self
            .inner
            .uid_store(&uid_set, "+FLAGS (\\Deleted)")
            .await?
            .try_collect()
            .await?;
        drop(updates);

        let expunged: Vec<_> = self.inner.expunge().await?.try_collect().await?;
        debug!(folder, count = sorted.len(), "expunged aged messages");
        drop(expunged);

        Ok(sorted.len() as u64)
    }

    /// Count messages in a folder without mutating any \Recent state.
    ///
    /// # Errors
    ///
    /// Returns an error if EXAMINE fails.
    pub async fn count(&mut self, folder: &str) -> Result<u32> {
        let mailbox = self.inner.examine(folder).await?;
        // EXAMINE deselects any prior SELECT.
        self.selected = None;
        Ok(mailbox.exists)
    }

    /// Log out and tear down the connection.
    ///
    /// A failed LOGOUT is only logged; the connection is dropped either way.
    pub async fn close(mut self) {
        if let Err(e) = self.inner.logout().await {
            warn!("IMAP logout failed: {e}");
        }
    }

    async fn select(&mut self, folder: &str) -> Result<()> {
        if self.selected.as_deref() != Some(folder) {
            self.inner.select(folder).await?;
            self.selected = Some(folder.to_string());
        }
        Ok(())
    }
}
