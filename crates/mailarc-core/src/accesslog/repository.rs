//! Access log storage.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use super::model::{AccessLogEntry, AccessType};
use crate::Result;

/// Append-only repository for the audit trail.
#[derive(Debug)]
pub struct AccessLogRepository {
    pool: SqlitePool,
}

impl AccessLogRepository {
    /// Create a new repository with the given database path.
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

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS access_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                access_type TEXT NOT NULL,
                context TEXT NOT NULL DEFAULT '',
                occurred_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one action.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn log(
        &self,
        username: &str,
        access_type: AccessType,
        context: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO access_log (username, access_type, context, occurred_at) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(access_type.as_str())
        .bind(context)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The most recent entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn recent(&self, limit: u32) -> Result<Vec<AccessLogEntry>> {
        let rows = sqlx::query("SELECT * FROM access_log ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<AccessLogEntry> {
    let occurred_at: String = row.get("occurred_at");
    Ok(AccessLogEntry {
        id: row.get("id"),
        username: row.get("username"),
        access_type: AccessType::from_str_lossy(row.get::<String, _>("access_type").as_str()),
        context: row.get("context"),
        occurred_at: DateTime::parse_from_rfc3339(&occurred_at)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_default(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_and_recent_returns_newest_first() {
        let repo = AccessLogRepository::in_memory().await.unwrap();

        repo.log("alice", AccessType::Login, "").await.unwrap();
        repo.log("alice", AccessType::Search, "invoice").await.unwrap();
        repo.log("bob", AccessType::Restore, "restored 3 emails")
            .await
            .unwrap();

        let entries = repo.recent(2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].username, "bob");
        assert_eq!(entries[0].access_type, AccessType::Restore);
        assert_eq!(entries[1].context, "invoice");
    }
}
