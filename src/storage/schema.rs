use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_error, StoreError};
use crate::config::DatabaseConfig;

// ============================================================================
// FeedStore
// ============================================================================

/// Handle to the feed database.
///
/// Cheap to clone: every clone shares the same connection pool. Construct one
/// at startup and hand it to whatever needs it.
#[derive(Clone)]
pub struct FeedStore {
    pub(crate) pool: SqlitePool,
}

impl FeedStore {
    /// Open a database with default pool settings and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database shared by every
    /// connection of the pool.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Self::open_with(path, &DatabaseConfig::default()).await
    }

    /// Open a database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InstanceLocked` if the database is locked by
    /// another process (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `StoreError::Migration` if schema setup fails.
    pub async fn open_with(path: &str, settings: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Pre-create the file owner-only so it never exists with umask permissions
        #[cfg(unix)]
        if path != ":memory:" {
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                use std::os::unix::fs::OpenOptionsExt;
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // SQLite reports the real error at connect
            }
        }

        // busy_timeout via pragma() so every pooled connection inherits it
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", settings.busy_timeout_ms.to_string());
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let store = Self { pool };
        store.migrate().await.map_err(|e| {
            if is_lock_error(&e.to_string()) {
                StoreError::InstanceLocked
            } else {
                StoreError::Migration(e.to_string())
            }
        })?;

        tracing::debug!(path = %path, "Feed store opened");
        Ok(store)
    }

    /// Close every pooled connection. Pending operations finish first.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run schema migrations in a single transaction.
    ///
    /// Every statement is `IF NOT EXISTS`, so re-running against an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL UNIQUE,
                is_expanded INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // feed_link is the business key; custom_order is text so OPML order
        // tokens like "a" or "10" both fit
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder_id INTEGER REFERENCES folders(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                link TEXT NOT NULL DEFAULT '',
                feed_link TEXT NOT NULL,
                icon BLOB,
                custom_order TEXT NOT NULL DEFAULT 'xxxxxxxxx'
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_feeds_feed_link ON feeds(feed_link)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feeds_folder ON feeds(folder_id)")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_errors (
                feed_id INTEGER NOT NULL UNIQUE REFERENCES feeds(id) ON DELETE CASCADE,
                error TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feed_sizes (
                feed_id INTEGER NOT NULL UNIQUE REFERENCES feeds(id) ON DELETE CASCADE,
                size INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
