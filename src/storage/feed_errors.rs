use futures::StreamExt;
use sqlx::{sqlite::SqliteRow, Row};
use std::collections::HashMap;
use std::fmt::Display;

use super::schema::FeedStore;
use super::types::StoreError;

fn error_from_row(row: &SqliteRow) -> Result<(i64, String), sqlx::Error> {
    Ok((row.try_get("feed_id")?, row.try_get("error")?))
}

impl FeedStore {
    // ========================================================================
    // Feed Error Operations
    // ========================================================================

    /// Forget every recorded feed error. Failures are logged, never returned.
    pub async fn reset_feed_errors(&self) {
        if let Err(e) = self.delete_all_feed_errors().await {
            tracing::warn!(error = %e, "Failed to reset feed errors");
        }
    }

    async fn delete_all_feed_errors(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM feed_errors")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the latest error for a feed, replacing any previous one.
    /// Failures are logged, never returned.
    pub async fn set_feed_error(&self, feed_id: i64, error: impl Display) {
        let message = error.to_string();
        if let Err(e) = self.upsert_feed_error(feed_id, &message).await {
            tracing::warn!(feed_id, error = %e, "Failed to record feed error");
        }
    }

    async fn upsert_feed_error(&self, feed_id: i64, message: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO feed_errors (feed_id, error)
            VALUES (?, ?)
            ON CONFLICT(feed_id) DO UPDATE SET error = excluded.error
        "#,
        )
        .bind(feed_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Latest error per feed id.
    ///
    /// A failed query yields an empty map. A row that fails to decode is
    /// logged and still inserted, with whatever id could be read (or 0) and
    /// an empty message.
    pub async fn get_feed_errors(&self) -> HashMap<i64, String> {
        let mut errors = HashMap::new();
        let mut rows = sqlx::query("SELECT feed_id, error FROM feed_errors").fetch(&self.pool);

        while let Some(row) = rows.next().await {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(error = %e, collected = errors.len(), "Feed error listing stopped early");
                    break;
                }
            };

            let (feed_id, message) = match error_from_row(&row) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to decode feed error row");
                    (row.try_get("feed_id").unwrap_or_default(), String::new())
                }
            };
            errors.insert(feed_id, message);
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{FeedStore, NewFeed};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    async fn test_store() -> FeedStore {
        FeedStore::open(":memory:").await.unwrap()
    }

    async fn seed_feed(store: &FeedStore, n: i64) -> i64 {
        store
            .create_feed(&NewFeed::new(format!("https://feed{}.example.com/rss", n)))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_set_feed_error() {
        let store = test_store().await;
        let feed_id = seed_feed(&store, 1).await;

        store.set_feed_error(feed_id, "connection refused").await;

        let errors = store.get_feed_errors().await;
        assert_eq!(
            errors,
            HashMap::from([(feed_id, "connection refused".to_string())])
        );
    }

    #[tokio::test]
    async fn test_set_feed_error_replaces_previous() {
        let store = test_store().await;
        let feed_id = seed_feed(&store, 1).await;

        store.set_feed_error(feed_id, "timeout").await;
        store.set_feed_error(feed_id, "HTTP 404").await;

        let errors = store.get_feed_errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[&feed_id], "HTTP 404");
    }

    #[tokio::test]
    async fn test_set_feed_error_accepts_error_values() {
        let store = test_store().await;
        let feed_id = seed_feed(&store, 1).await;

        let err = std::io::Error::other("disk on fire");
        store.set_feed_error(feed_id, &err).await;

        assert_eq!(store.get_feed_errors().await[&feed_id], "disk on fire");
    }

    #[tokio::test]
    async fn test_reset_feed_errors_clears_all() {
        let store = test_store().await;
        for n in 1..=3 {
            let feed_id = seed_feed(&store, n).await;
            store.set_feed_error(feed_id, format!("error {}", n)).await;
        }
        assert_eq!(store.get_feed_errors().await.len(), 3);

        store.reset_feed_errors().await;

        assert!(store.get_feed_errors().await.is_empty());
    }

    #[tokio::test]
    async fn test_reset_feed_errors_on_empty_table() {
        let store = test_store().await;
        store.reset_feed_errors().await;
        assert!(store.get_feed_errors().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_feed_error_unknown_feed_is_swallowed() {
        let store = test_store().await;

        // Rejected by the foreign key; logged only
        store.set_feed_error(999, "orphan").await;

        assert!(store.get_feed_errors().await.is_empty());
    }

    #[tokio::test]
    async fn test_feed_errors_removed_with_feed() {
        let store = test_store().await;
        let feed_id = seed_feed(&store, 1).await;
        store.set_feed_error(feed_id, "timeout").await;

        assert!(store.delete_feed(feed_id).await);

        assert!(store.get_feed_errors().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_feed_errors_keeps_undecodable_row() {
        let store = test_store().await;
        let good = seed_feed(&store, 1).await;
        let bad = seed_feed(&store, 2).await;
        store.set_feed_error(good, "ok").await;

        // Not valid UTF-8, so the message cannot decode as a String
        sqlx::query("INSERT INTO feed_errors (feed_id, error) VALUES (?, x'00ff')")
            .bind(bad)
            .execute(&store.pool)
            .await
            .unwrap();

        let errors = store.get_feed_errors().await;
        assert_eq!(
            errors,
            HashMap::from([(good, "ok".to_string()), (bad, String::new())])
        );
    }

    #[tokio::test]
    async fn test_get_feed_errors_without_table_is_empty() {
        let store = test_store().await;
        sqlx::query("DROP TABLE feed_errors")
            .execute(&store.pool)
            .await
            .unwrap();

        store.set_feed_error(1, "nowhere to go").await;
        store.reset_feed_errors().await;
        assert!(store.get_feed_errors().await.is_empty());
    }
}
