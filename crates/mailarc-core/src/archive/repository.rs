//! Archive storage repository.
//!
//! Writers go through guard methods that check the compliance lock in the
//! application layer; nothing relies on database triggers to keep locked
//! rows immutable.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::model::{ArchivedEmail, ArchivedEmailId, EmailAttachment};
use crate::account::MailAccountId;
use crate::{Error, Result};

/// Repository for archived emails and their attachments.
#[derive(Debug)]
pub struct ArchiveRepository {
    pool: SqlitePool,
}

impl ArchiveRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS archived_emails (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                message_id TEXT NOT NULL,
                folder_name TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                from_addr TEXT NOT NULL DEFAULT '',
                to_addrs TEXT NOT NULL DEFAULT '[]',
                cc_addrs TEXT NOT NULL DEFAULT '[]',
                bcc_addrs TEXT NOT NULL DEFAULT '[]',
                sent_at TEXT,
                received_at TEXT NOT NULL,
                body_text TEXT,
                body_html TEXT,
                body_raw BLOB,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                content_hash TEXT NOT NULL,
                hash_created_at TEXT NOT NULL,
                is_locked INTEGER NOT NULL DEFAULT 0,
                archived_at TEXT NOT NULL,
                UNIQUE(account_id, message_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id INTEGER NOT NULL REFERENCES archived_emails(id) ON DELETE CASCADE,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                content BLOB NOT NULL,
                content_id TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_archived_hash
            ON archived_emails(account_id, content_hash)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_archived_received
            ON archived_emails(account_id, received_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_attachments_email
            ON email_attachments(email_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an email and its attachments in one transaction.
    ///
    /// Each per-message write commits independently, so a mid-job failure
    /// only loses the in-flight item.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails (including a dedup-key
    /// uniqueness violation when a concurrent writer raced us).
    pub async fn insert(
        &self,
        email: &mut ArchivedEmail,
        attachments: &[EmailAttachment],
    ) -> Result<ArchivedEmailId> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            INSERT INTO archived_emails (
                account_id, message_id, folder_name, subject, from_addr,
                to_addrs, cc_addrs, bcc_addrs, sent_at, received_at,
                body_text, body_html, body_raw, has_attachments,
                content_hash, hash_created_at, is_locked, archived_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(email.account_id.0)
        .bind(&email.message_id)
        .bind(&email.folder_name)
        .bind(&email.subject)
        .bind(&email.from_addr)
        .bind(serde_json::to_string(&email.to_addrs)?)
        .bind(serde_json::to_string(&email.cc_addrs)?)
        .bind(serde_json::to_string(&email.bcc_addrs)?)
        .bind(email.sent_at.map(fmt_ts))
        .bind(fmt_ts(email.received_at))
        .bind(&email.body_text)
        .bind(&email.body_html)
        .bind(&email.body_raw)
        .bind(email.has_attachments)
        .bind(&email.content_hash)
        .bind(fmt_ts(email.hash_created_at))
        .bind(email.is_locked)
        .bind(fmt_ts(email.archived_at))
        .execute(&mut *tx)
        .await?;

        let id = ArchivedEmailId::new(result.last_insert_rowid());

        for attachment in attachments {
            sqlx::query(
                r"
                INSERT INTO email_attachments (email_id, filename, content_type, content, content_id)
                VALUES (?, ?, ?, ?, ?)
                ",
            )
            .bind(id.0)
            .bind(&attachment.filename)
            .bind(&attachment.content_type)
            .bind(&attachment.content)
            .bind(&attachment.content_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        email.id = Some(id);
        Ok(id)
    }

    /// Whether the dedup key `(account_id, message_id)` is already archived.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn exists(&self, account_id: MailAccountId, message_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM archived_emails WHERE account_id = ? AND message_id = ? LIMIT 1",
        )
        .bind(account_id.0)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Whether a content hash is already archived for the account.
    ///
    /// Used by the import path to skip byte-identical duplicate files.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn hash_exists(&self, account_id: MailAccountId, content_hash: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM archived_emails WHERE account_id = ? AND content_hash = ? LIMIT 1",
        )
        .bind(account_id.0)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Get an archived email by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: ArchivedEmailId) -> Result<Option<ArchivedEmail>> {
        let row = sqlx::query("SELECT * FROM archived_emails WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_email).transpose()
    }

    /// Get an archived email by ID, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotFound`] when the id is unknown.
    pub async fn get_required(&self, id: ArchivedEmailId) -> Result<ArchivedEmail> {
        self.get(id).await?.ok_or(Error::EmailNotFound(id.0))
    }

    /// Load the attachments of an email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn attachments(&self, email_id: ArchivedEmailId) -> Result<Vec<EmailAttachment>> {
        let rows = sqlx::query("SELECT * FROM email_attachments WHERE email_id = ? ORDER BY id")
            .bind(email_id.0)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| EmailAttachment {
                id: Some(row.get("id")),
                email_id: Some(ArchivedEmailId::new(row.get("email_id"))),
                filename: row.get("filename"),
                content_type: row.get("content_type"),
                content: row.get("content"),
                content_id: row.get("content_id"),
            })
            .collect())
    }

    /// IDs of every archived email owned by an account, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_ids_for_account(
        &self,
        account_id: MailAccountId,
    ) -> Result<Vec<ArchivedEmailId>> {
        let rows = sqlx::query(
            "SELECT id FROM archived_emails WHERE account_id = ? ORDER BY received_at, id",
        )
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ArchivedEmailId::new(row.get("id")))
            .collect())
    }

    /// Number of archived emails owned by an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_for_account(&self, account_id: MailAccountId) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM archived_emails WHERE account_id = ?")
            .bind(account_id.0)
            .fetch_one(&self.pool)
            .await?;

        let n: i64 = row.get("n");
        Ok(n.unsigned_abs())
    }

    /// Set or clear the compliance lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotFound`] when the id is unknown.
    pub async fn set_locked(&self, id: ArchivedEmailId, locked: bool) -> Result<()> {
        let result = sqlx::query("UPDATE archived_emails SET is_locked = ? WHERE id = ?")
            .bind(locked)
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::EmailNotFound(id.0));
        }
        Ok(())
    }

    /// Delete one archived email and its attachments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailLocked`] for a locked row (fail closed) and
    /// [`Error::EmailNotFound`] for an unknown id.
    pub async fn delete(&self, id: ArchivedEmailId) -> Result<()> {
        let email = self.get_required(id).await?;
        if email.is_locked {
            return Err(Error::EmailLocked(id.0));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM email_attachments WHERE email_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM archived_emails WHERE id = ? AND is_locked = 0")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Delete all unlocked emails of an account older than `cutoff`.
    ///
    /// Locked rows are skipped regardless of age. Returns the number of
    /// emails removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete_older_than(
        &self,
        account_id: MailAccountId,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let cutoff = fmt_ts(cutoff);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            DELETE FROM email_attachments WHERE email_id IN (
                SELECT id FROM archived_emails
                WHERE account_id = ? AND received_at < ? AND is_locked = 0
            )
            ",
        )
        .bind(account_id.0)
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "DELETE FROM archived_emails WHERE account_id = ? AND received_at < ? AND is_locked = 0",
        )
        .bind(account_id.0)
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            account_id = account_id.0,
            deleted = result.rows_affected(),
            "local retention pass"
        );
        Ok(result.rows_affected())
    }
}

/// Timestamps are stored second-precision RFC3339 (`...Z`), which sorts
/// lexicographically and therefore works with `<` comparisons in SQL.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::MailParse(format!("invalid stored timestamp {raw:?}: {e}")))
}

fn row_to_email(row: &SqliteRow) -> Result<ArchivedEmail> {
    Ok(ArchivedEmail {
        id: Some(ArchivedEmailId::new(row.get("id"))),
        account_id: MailAccountId::new(row.get("account_id")),
        message_id: row.get("message_id"),
        folder_name: row.get("folder_name"),
        subject: row.get("subject"),
        from_addr: row.get("from_addr"),
        to_addrs: serde_json::from_str(row.get::<String, _>("to_addrs").as_str())?,
        cc_addrs: serde_json::from_str(row.get::<String, _>("cc_addrs").as_str())?,
        bcc_addrs: serde_json::from_str(row.get::<String, _>("bcc_addrs").as_str())?,
        sent_at: row
            .get::<Option<String>, _>("sent_at")
            .as_deref()
            .map(parse_ts)
            .transpose()?,
        received_at: parse_ts(row.get::<String, _>("received_at").as_str())?,
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        body_raw: row.get("body_raw"),
        has_attachments: row.get::<i64, _>("has_attachments") != 0,
        content_hash: row.get("content_hash"),
        hash_created_at: parse_ts(row.get::<String, _>("hash_created_at").as_str())?,
        is_locked: row.get::<i64, _>("is_locked") != 0,
        archived_at: parse_ts(row.get::<String, _>("archived_at").as_str())?,
    })
}
