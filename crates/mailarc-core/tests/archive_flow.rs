//! End-to-end sync, retention and restore flows over a scripted
//! in-memory transport.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use mailarc_core::accesslog::{AccessLogRepository, AccessType};
use mailarc_core::account::{
    AccountRepository, ImapSettings, MailAccount, MailAccountId, ProviderType,
};
use mailarc_core::archive::{ArchiveRepository, ArchivedEmailId, parse_email};
use mailarc_core::job::{PacingConfig, SyncProgress};
use mailarc_core::provider::{FetchedMessage, MailTransport, ProviderEngine, TransportConnector};
use mailarc_core::{Error, Result};

/// In-memory mailbox shared between a connector and the transports it
/// hands out, so tests can inspect what the engine did to it.
#[derive(Default)]
struct Mailbox {
    folders: Vec<(String, Vec<FetchedMessage>)>,
    appended: Vec<(String, Vec<u8>)>,
    /// `since` argument of every fetch, in call order.
    fetch_windows: Vec<Option<DateTime<Utc>>>,
    closed: bool,
}

impl Mailbox {
    fn with_folder(name: &str, messages: Vec<FetchedMessage>) -> Arc<Mutex<Self>> {
        let mut mailbox = Self::default();
        mailbox.folders.push((name.to_string(), messages));
        Arc::new(Mutex::new(mailbox))
    }

    fn add_folder(mailbox: &Arc<Mutex<Self>>, name: &str, messages: Vec<FetchedMessage>) {
        mailbox
            .lock()
            .unwrap()
            .folders
            .push((name.to_string(), messages));
    }
}

struct ScriptedConnector {
    mailbox: Arc<Mutex<Mailbox>>,
    refuse_connections: bool,
    /// Fetching this folder fails, simulating a dropped link mid-run.
    broken_folder: Option<String>,
}

impl ScriptedConnector {
    fn new(mailbox: Arc<Mutex<Mailbox>>) -> Self {
        Self {
            mailbox,
            refuse_connections: false,
            broken_folder: None,
        }
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn connect(&self, _account: &MailAccount) -> Result<Box<dyn MailTransport>> {
        if self.refuse_connections {
            return Err(Error::Connection("connection refused".to_string()));
        }
        Ok(Box::new(ScriptedTransport {
            mailbox: Arc::clone(&self.mailbox),
            broken_folder: self.broken_folder.clone(),
        }))
    }
}

struct ScriptedTransport {
    mailbox: Arc<Mutex<Mailbox>>,
    broken_folder: Option<String>,
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn list_folders(&mut self) -> Result<Vec<String>> {
        let mailbox = self.mailbox.lock().unwrap();
        Ok(mailbox.folders.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn fetch_since(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<FetchedMessage>> {
        if self.broken_folder.as_deref() == Some(folder) {
            return Err(Error::Connection("link dropped".to_string()));
        }
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.fetch_windows.push(since);
        let messages = mailbox
            .folders
            .iter()
            .find(|(name, _)| name == folder)
            .map(|(_, messages)| messages.clone())
            .unwrap_or_default();
        Ok(messages
            .into_iter()
            .filter(|m| match (since, m.received_at) {
                (Some(since), Some(received)) => received >= since,
                _ => since.is_none(),
            })
            .collect())
    }

    async fn append(&mut self, folder: &str, raw: &[u8]) -> Result<()> {
        self.mailbox
            .lock()
            .unwrap()
            .appended
            .push((folder.to_string(), raw.to_vec()));
        Ok(())
    }

    async fn delete_older_than(&mut self, folder: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut mailbox = self.mailbox.lock().unwrap();
        let Some((_, messages)) = mailbox.folders.iter_mut().find(|(name, _)| name == folder)
        else {
            return Ok(0);
        };
        let before = messages.len();
        messages.retain(|m| m.received_at.is_none_or(|received| received >= cutoff));
        Ok((before - messages.len()) as u64)
    }

    async fn count(&mut self, folder: &str) -> Result<u64> {
        let mailbox = self.mailbox.lock().unwrap();
        Ok(mailbox
            .folders
            .iter()
            .find(|(name, _)| name == folder)
            .map_or(0, |(_, messages)| messages.len() as u64))
    }

    async fn close(&mut self) -> Result<()> {
        self.mailbox.lock().unwrap().closed = true;
        Ok(())
    }
}

fn message(n: u32, received_at: DateTime<Utc>) -> FetchedMessage {
    let raw = format!(
        "Message-ID: <{n}@flow.test>\r\nFrom: Sender <sender@flow.test>\r\n\
         To: archive@flow.test\r\nSubject: message {n}\r\n\r\nbody {n}\r\n"
    );
    FetchedMessage {
        message_id: Some(format!("<{n}@flow.test>")),
        raw: raw.into_bytes(),
        received_at: Some(received_at),
    }
}

struct Harness {
    accounts: Arc<AccountRepository>,
    archive: Arc<ArchiveRepository>,
    access_log: Arc<AccessLogRepository>,
    engine: ProviderEngine,
}

async fn harness() -> Harness {
    let accounts = Arc::new(AccountRepository::in_memory().await.unwrap());
    let archive = Arc::new(ArchiveRepository::in_memory().await.unwrap());
    let access_log = Arc::new(AccessLogRepository::in_memory().await.unwrap());
    let engine = ProviderEngine::new(
        Arc::clone(&accounts),
        Arc::clone(&archive),
        Arc::clone(&access_log),
        PacingConfig::unpaced(),
    );
    Harness {
        accounts,
        archive,
        access_log,
        engine,
    }
}

impl Harness {
    async fn imap_account(&self) -> MailAccount {
        let mut account = MailAccount::new("Flow", "alice", ProviderType::Imap);
        account.imap = Some(ImapSettings {
            server: "mail.flow.test".to_string(),
            port: 993,
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        });
        self.accounts.save(&mut account).await.unwrap();
        account
    }

    async fn reload(&self, account: &MailAccount) -> MailAccount {
        self.accounts.get(account.id.unwrap()).await.unwrap().unwrap()
    }

    async fn insert_archived(
        &self,
        account_id: MailAccountId,
        n: u32,
        received_at: DateTime<Utc>,
    ) -> ArchivedEmailId {
        let raw = format!("Message-ID: <local-{n}@flow.test>\nSubject: local {n}\n\nbody\n");
        let (mut email, attachments) = parse_email(raw.as_bytes()).unwrap().into_archived(
            account_id,
            "INBOX",
            Some(received_at),
            raw.as_bytes(),
        );
        self.archive.insert(&mut email, &attachments).await.unwrap()
    }
}

#[tokio::test]
async fn sync_archives_once_and_later_runs_are_idempotent() {
    let h = harness().await;
    let account = h.imap_account().await;
    // Comfortably before the sync point the first run records, which is
    // persisted at whole-second precision.
    let received = Utc::now() - Duration::minutes(5);
    let mailbox = Mailbox::with_folder(
        "INBOX",
        vec![message(1, received), message(2, received), message(3, received)],
    );
    Mailbox::add_folder(&mailbox, "Sent", vec![message(4, received)]);
    let connector = ScriptedConnector::new(Arc::clone(&mailbox));

    let progress = SyncProgress::default();
    let cancel = CancellationToken::new();
    let report = h
        .engine
        .sync(&connector, &account, false, Some(&progress), &cancel)
        .await
        .unwrap();

    assert_eq!(report.folders, 2);
    assert_eq!(report.processed, 4);
    assert_eq!(report.archived, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(progress.folders_total.load(Ordering::Relaxed), 2);
    assert_eq!(progress.new_emails.load(Ordering::Relaxed), 4);
    assert_eq!(
        h.archive.count_for_account(account.id.unwrap()).await.unwrap(),
        4
    );
    assert!(mailbox.lock().unwrap().closed);

    // Incremental second run: the window starts at last_sync, which is
    // after every message above, so nothing is even fetched.
    let account = h.reload(&account).await;
    let advanced_to = account.last_sync.unwrap();
    assert!(advanced_to > received);
    let report = h
        .engine
        .sync(&connector, &account, false, None, &cancel)
        .await
        .unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.archived, 0);

    // Forced full rescan refetches everything and dedups it all away.
    let report = h
        .engine
        .sync(&connector, &account, true, None, &cancel)
        .await
        .unwrap();
    assert_eq!(report.processed, 4);
    assert_eq!(report.archived, 0);
    assert_eq!(
        h.archive.count_for_account(account.id.unwrap()).await.unwrap(),
        4
    );

    let windows = mailbox.lock().unwrap().fetch_windows.clone();
    assert_eq!(windows[0], None);
    assert_eq!(windows[1], None);
    assert_eq!(windows[2], Some(advanced_to));
    assert_eq!(windows[3], Some(advanced_to));
    assert_eq!(windows[4], None);
    assert_eq!(windows[5], None);
}

#[tokio::test]
async fn excluded_folders_are_not_scanned() {
    let h = harness().await;
    let mut account = h.imap_account().await;
    account.excluded_folders = vec!["Junk".to_string()];
    h.accounts.save(&mut account).await.unwrap();

    let now = Utc::now();
    let mailbox = Mailbox::with_folder("INBOX", vec![message(1, now)]);
    Mailbox::add_folder(&mailbox, "Junk", vec![message(2, now)]);
    let connector = ScriptedConnector::new(Arc::clone(&mailbox));

    let report = h
        .engine
        .sync(&connector, &account, false, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.folders, 1);
    assert_eq!(report.archived, 1);
}

#[tokio::test]
async fn unparseable_message_is_counted_and_skipped() {
    let h = harness().await;
    let account = h.imap_account().await;
    let now = Utc::now();
    let garbage = FetchedMessage {
        message_id: None,
        raw: b"no header section here at all".to_vec(),
        received_at: Some(now),
    };
    let mailbox = Mailbox::with_folder("INBOX", vec![message(1, now), garbage, message(2, now)]);
    let connector = ScriptedConnector::new(Arc::clone(&mailbox));

    let report = h
        .engine
        .sync(&connector, &account, false, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.archived, 2);
    assert_eq!(report.failed, 1);
    // The run still counts as complete, so the sync point advances.
    assert!(h.reload(&account).await.last_sync.is_some());
}

#[tokio::test]
async fn refused_connection_leaves_last_sync_untouched() {
    let h = harness().await;
    let account = h.imap_account().await;
    let mailbox = Mailbox::with_folder("INBOX", vec![message(1, Utc::now())]);
    let mut connector = ScriptedConnector::new(mailbox);
    connector.refuse_connections = true;

    let err = h
        .engine
        .sync(&connector, &account, false, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    assert!(h.reload(&account).await.last_sync.is_none());
}

#[tokio::test]
async fn mid_run_failure_keeps_archived_messages_but_not_the_sync_point() {
    let h = harness().await;
    let account = h.imap_account().await;
    let now = Utc::now();
    let mailbox = Mailbox::with_folder("INBOX", vec![message(1, now)]);
    Mailbox::add_folder(&mailbox, "Sent", vec![message(2, now)]);
    let mut connector = ScriptedConnector::new(Arc::clone(&mailbox));
    connector.broken_folder = Some("Sent".to_string());

    let err = h
        .engine
        .sync(&connector, &account, false, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    // INBOX landed before the failure; the next run rescans from scratch
    // and dedup keeps it from doubling.
    assert_eq!(
        h.archive.count_for_account(account.id.unwrap()).await.unwrap(),
        1
    );
    assert!(h.reload(&account).await.last_sync.is_none());
}

#[tokio::test]
async fn cancelled_sync_stops_without_advancing_last_sync() {
    let h = harness().await;
    let account = h.imap_account().await;
    let mailbox = Mailbox::with_folder("INBOX", vec![message(1, Utc::now())]);
    let connector = ScriptedConnector::new(mailbox);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h
        .engine
        .sync(&connector, &account, false, None, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(h.reload(&account).await.last_sync.is_none());
}

#[tokio::test]
async fn sync_applies_server_and_local_retention() {
    let h = harness().await;
    let mut account = h.imap_account().await;
    account.delete_after_days = Some(30);
    account.local_retention_days = Some(60);
    h.accounts.save(&mut account).await.unwrap();
    let account_id = account.id.unwrap();

    let now = Utc::now();
    let stale = now - Duration::days(100);
    let mailbox = Mailbox::with_folder("INBOX", vec![message(1, now), message(2, stale)]);
    let connector = ScriptedConnector::new(Arc::clone(&mailbox));

    // A row archived long ago, overdue for the local pass.
    h.insert_archived(account_id, 9, stale).await;

    let report = h
        .engine
        .sync(&connector, &account, false, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.archived, 2);
    // The stale remote message is gone from the mailbox.
    assert_eq!(report.server_deleted, 1);
    assert_eq!(mailbox.lock().unwrap().folders[0].1.len(), 1);
    // Both stale rows (the pre-existing one and the one archived this
    // run) fall to local retention; the fresh one stays.
    assert_eq!(report.local_deleted, 2);
    assert_eq!(h.archive.count_for_account(account_id).await.unwrap(), 1);

    let entries = h.access_log.recent(10).await.unwrap();
    assert!(
        entries
            .iter()
            .any(|e| e.access_type == AccessType::Deletion)
    );
}

#[tokio::test]
async fn locked_rows_survive_local_retention() {
    let h = harness().await;
    let mut account = h.imap_account().await;
    account.delete_after_days = Some(30);
    account.local_retention_days = Some(60);
    h.accounts.save(&mut account).await.unwrap();
    let account_id = account.id.unwrap();

    let stale = Utc::now() - Duration::days(100);
    let locked = h.insert_archived(account_id, 1, stale).await;
    h.archive.set_locked(locked, true).await.unwrap();

    let mailbox = Mailbox::with_folder("INBOX", vec![]);
    let connector = ScriptedConnector::new(mailbox);
    let report = h
        .engine
        .sync(&connector, &account, false, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.local_deleted, 0);
    assert!(h.archive.get(locked).await.unwrap().is_some());
}

#[tokio::test]
async fn restore_uploads_messages_and_counts_missing_ids() {
    let h = harness().await;
    let account = h.imap_account().await;
    let account_id = account.id.unwrap();
    let now = Utc::now();
    let first = h.insert_archived(account_id, 1, now).await;
    let second = h.insert_archived(account_id, 2, now).await;

    let mailbox = Mailbox::with_folder("Restored", vec![]);
    let connector = ScriptedConnector::new(Arc::clone(&mailbox));

    let (succeeded, failed) = h
        .engine
        .restore_many(
            &connector,
            &[first, ArchivedEmailId::new(9_999), second],
            &account,
            "Restored",
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(succeeded, 2);
    assert_eq!(failed, 1);
    let appended = mailbox.lock().unwrap().appended.clone();
    assert_eq!(appended.len(), 2);
    assert!(appended.iter().all(|(folder, _)| folder == "Restored"));
    // The rebuilt messages parse back to what was archived.
    assert!(
        String::from_utf8(appended[0].1.clone())
            .unwrap()
            .contains("local 1")
    );

    let entries = h.access_log.recent(10).await.unwrap();
    assert!(entries.iter().any(|e| e.access_type == AccessType::Restore));
}

#[tokio::test]
async fn cancelled_restore_keeps_partial_counts() {
    let h = harness().await;
    let account = h.imap_account().await;
    let id = h.insert_archived(account.id.unwrap(), 1, Utc::now()).await;

    let mailbox = Mailbox::with_folder("Restored", vec![]);
    let connector = ScriptedConnector::new(Arc::clone(&mailbox));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (succeeded, failed) = h
        .engine
        .restore_many(&connector, &[id], &account, "Restored", None, &cancel)
        .await
        .unwrap();

    assert_eq!(succeeded, 0);
    assert_eq!(failed, 0);
    assert!(mailbox.lock().unwrap().appended.is_empty());
}

#[tokio::test]
async fn count_skips_excluded_folders() {
    let h = harness().await;
    let mut account = h.imap_account().await;
    account.excluded_folders = vec!["Junk".to_string()];
    h.accounts.save(&mut account).await.unwrap();

    let now = Utc::now();
    let mailbox = Mailbox::with_folder("INBOX", vec![message(1, now), message(2, now)]);
    Mailbox::add_folder(&mailbox, "Junk", vec![message(3, now)]);
    let connector = ScriptedConnector::new(mailbox);

    let total = h.engine.count_emails(&connector, &account).await.unwrap();
    assert_eq!(total, 2);
}
