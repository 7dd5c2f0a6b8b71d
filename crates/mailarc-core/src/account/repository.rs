//! Mail account storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::model::{GraphSettings, ImapSettings, MailAccount, MailAccountId, ProviderType};
use super::validation::validate_account;
use crate::{Error, Result};

/// Repository for mail account storage and retrieval.
#[derive(Debug)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
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

    /// Reuse an existing pool (shared database file with the archive store).
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mail_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                imap_server TEXT,
                imap_port INTEGER,
                imap_username TEXT,
                imap_password TEXT,
                graph_client_id TEXT,
                graph_client_secret TEXT,
                graph_tenant_id TEXT,
                graph_mailbox TEXT,
                excluded_folders TEXT NOT NULL DEFAULT '[]',
                last_sync TEXT,
                is_enabled INTEGER NOT NULL DEFAULT 1,
                always_full_sync INTEGER NOT NULL DEFAULT 0,
                delete_after_days INTEGER,
                local_retention_days INTEGER,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<MailAccount>> {
        let rows = sqlx::query("SELECT * FROM mail_accounts ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_account).collect()
    }

    /// Get all enabled accounts (scheduled sync candidates).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_enabled(&self) -> Result<Vec<MailAccount>> {
        let rows = sqlx::query("SELECT * FROM mail_accounts WHERE is_enabled = 1 ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_account).collect()
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: MailAccountId) -> Result<Option<MailAccount>> {
        let row = sqlx::query("SELECT * FROM mail_accounts WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Get account by ID, failing when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] when the id is unknown.
    pub async fn get_required(&self, id: MailAccountId) -> Result<MailAccount> {
        self.get(id)
            .await?
            .ok_or(Error::AccountNotFound(id.0))
    }

    /// Save an account (insert or update).
    ///
    /// Runs validation first; a violating configuration is rejected before
    /// anything touches the database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an invalid configuration, or a
    /// database error if the write fails.
    pub async fn save(&self, account: &mut MailAccount) -> Result<()> {
        validate_account(account).map_err(Error::Validation)?;

        let excluded = serde_json::to_string(&account.excluded_folders)?;
        let imap = account.imap.as_ref();
        let graph = account.graph.as_ref();

        if let Some(id) = account.id {
            sqlx::query(
                r"
                UPDATE mail_accounts SET
                    name = ?, user_id = ?, provider = ?,
                    imap_server = ?, imap_port = ?, imap_username = ?, imap_password = ?,
                    graph_client_id = ?, graph_client_secret = ?, graph_tenant_id = ?, graph_mailbox = ?,
                    excluded_folders = ?, last_sync = ?, is_enabled = ?, always_full_sync = ?,
                    delete_after_days = ?, local_retention_days = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                ",
            )
            .bind(&account.name)
            .bind(&account.user_id)
            .bind(account.provider.as_str())
            .bind(imap.map(|s| s.server.clone()))
            .bind(imap.map(|s| i64::from(s.port)))
            .bind(imap.map(|s| s.username.clone()))
            .bind(imap.map(|s| s.password.clone()))
            .bind(graph.map(|s| s.client_id.clone()))
            .bind(graph.map(|s| s.client_secret.clone()))
            .bind(graph.map(|s| s.tenant_id.clone()))
            .bind(graph.map(|s| s.mailbox.clone()))
            .bind(&excluded)
            .bind(account.last_sync.map(|ts| ts.to_rfc3339()))
            .bind(account.is_enabled)
            .bind(account.always_full_sync)
            .bind(account.delete_after_days.map(i64::from))
            .bind(account.local_retention_days.map(i64::from))
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        } else {
            let result = sqlx::query(
                r"
                INSERT INTO mail_accounts (
                    name, user_id, provider,
                    imap_server, imap_port, imap_username, imap_password,
                    graph_client_id, graph_client_secret, graph_tenant_id, graph_mailbox,
                    excluded_folders, last_sync, is_enabled, always_full_sync,
                    delete_after_days, local_retention_days
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&account.name)
            .bind(&account.user_id)
            .bind(account.provider.as_str())
            .bind(imap.map(|s| s.server.clone()))
            .bind(imap.map(|s| i64::from(s.port)))
            .bind(imap.map(|s| s.username.clone()))
            .bind(imap.map(|s| s.password.clone()))
            .bind(graph.map(|s| s.client_id.clone()))
            .bind(graph.map(|s| s.client_secret.clone()))
            .bind(graph.map(|s| s.tenant_id.clone()))
            .bind(graph.map(|s| s.mailbox.clone()))
            .bind(&excluded)
            .bind(account.last_sync.map(|ts| ts.to_rfc3339()))
            .bind(account.is_enabled)
            .bind(account.always_full_sync)
            .bind(account.delete_after_days.map(i64::from))
            .bind(account.local_retention_days.map(i64::from))
            .execute(&self.pool)
            .await?;

            account.id = Some(MailAccountId::new(result.last_insert_rowid()));
            debug!(account_id = result.last_insert_rowid(), "created mail account");
        }

        Ok(())
    }

    /// Advance `last_sync` after a fully completed folder scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_last_sync(&self, id: MailAccountId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE mail_accounts SET last_sync = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete an account.
    ///
    /// Archived emails are removed separately by the account deletion job,
    /// which refuses to touch locked rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: MailAccountId) -> Result<()> {
        sqlx::query("DELETE FROM mail_accounts WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Convert a database row to a `MailAccount`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn row_to_account(row: &SqliteRow) -> Result<MailAccount> {
    let provider = ProviderType::from_str_lossy(row.get("provider"));

    let imap = row
        .get::<Option<String>, _>("imap_server")
        .map(|server| ImapSettings {
            server,
            port: row.get::<Option<i64>, _>("imap_port").unwrap_or(0) as u16,
            username: row.get::<Option<String>, _>("imap_username").unwrap_or_default(),
            password: row.get::<Option<String>, _>("imap_password").unwrap_or_default(),
        });

    let graph = row
        .get::<Option<String>, _>("graph_client_id")
        .map(|client_id| GraphSettings {
            client_id,
            client_secret: row
                .get::<Option<String>, _>("graph_client_secret")
                .unwrap_or_default(),
            tenant_id: row
                .get::<Option<String>, _>("graph_tenant_id")
                .unwrap_or_default(),
            mailbox: row
                .get::<Option<String>, _>("graph_mailbox")
                .unwrap_or_default(),
        });

    let excluded_folders: Vec<String> =
        serde_json::from_str(row.get::<String, _>("excluded_folders").as_str())?;

    let last_sync = row
        .get::<Option<String>, _>("last_sync")
        .as_deref()
        .map(DateTime::parse_from_rfc3339)
        .transpose()
        .map_err(|e| Error::MailParse(format!("invalid last_sync timestamp: {e}")))?
        .map(|ts| ts.with_timezone(&Utc));

    Ok(MailAccount {
        id: Some(MailAccountId::new(row.get("id"))),
        name: row.get("name"),
        user_id: row.get("user_id"),
        provider,
        imap,
        graph,
        excluded_folders,
        last_sync,
        is_enabled: row.get::<i64, _>("is_enabled") != 0,
        always_full_sync: row.get::<i64, _>("always_full_sync") != 0,
        delete_after_days: row
            .get::<Option<i64>, _>("delete_after_days")
            .map(|d| d as u32),
        local_retention_days: row
            .get::<Option<i64>, _>("local_retention_days")
            .map(|d| d as u32),
    })
}
