//! SQLite index of message versions.

use std::path::Path;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row,
};

use crate::error::Result;

/// Message metadata stored in SQLite.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub(crate) struct MessageMetadata {
    pub uid: i64,
    pub subject: String,
    pub size: i64,
    pub state: MessageState,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Lifecycle of a message version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum MessageState {
    /// Row reserved, body upload in progress
    #[default]
    Pending,
    /// Body stored; visible to search and fetch
    Live,
    /// Flagged deleted; waiting for expunge
    Deleted,
}

impl MessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageState::Pending => "pending",
            MessageState::Live => "live",
            MessageState::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "live" => MessageState::Live,
            "deleted" => MessageState::Deleted,
            _ => MessageState::Pending,
        }
    }
}

/// SQLite database connection pool.
#[derive(Debug, Clone)]
pub(crate) struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path.
    pub async fn new(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database.
    ///
    /// The pool is pinned to a single connection that never expires, since
    /// dropping it would drop the database with it.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Reserve a uid for a new message version in the pending state.
    pub async fn reserve_message(&self, subject: &str, size: i64) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO messages (subject, size, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(subject)
        .bind(size)
        .bind(MessageState::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Move a message to a new state. Returns whether the row changed.
    pub async fn set_state(&self, uid: i64, state: MessageState) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE messages SET state = ?, updated_at = ?
            WHERE uid = ? AND state != ?
            "#,
        )
        .bind(state.as_str())
        .bind(now)
        .bind(uid)
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Get message metadata by uid.
    pub async fn get_message(&self, uid: i64) -> Result<Option<MessageMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT uid, subject, size, state, created_at, updated_at
            FROM messages
            WHERE uid = ?
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| MessageMetadata {
            uid: r.get("uid"),
            subject: r.get("subject"),
            size: r.get("size"),
            state: MessageState::parse(r.get("state")),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Live uids carrying `subject`, oldest first.
    pub async fn search_subject(&self, subject: &str) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT uid FROM messages
            WHERE subject = ? AND state = ?
            ORDER BY uid ASC
            "#,
        )
        .bind(subject)
        .bind(MessageState::Live.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("uid")).collect())
    }

    /// Every live (subject, uid) pair, oldest first.
    pub async fn list_live(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT subject, uid FROM messages
            WHERE state = ?
            ORDER BY uid ASC
            "#,
        )
        .bind(MessageState::Live.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| (r.get("subject"), r.get("uid")))
            .collect())
    }

    /// Uids flagged deleted.
    pub async fn list_deleted(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT uid FROM messages WHERE state = ?
            "#,
        )
        .bind(MessageState::Deleted.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("uid")).collect())
    }

    /// Uids still pending that were reserved at or before `cutoff` (unix seconds).
    pub async fn list_pending_before(&self, cutoff: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT uid FROM messages WHERE state = ? AND created_at <= ?
            "#,
        )
        .bind(MessageState::Pending.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("uid")).collect())
    }

    /// Remove a message row.
    pub async fn delete_message(&self, uid: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM messages WHERE uid = ?
            "#,
        )
        .bind(uid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
