use sqlx::Row;
use std::collections::HashMap;

use super::schema::FeedStore;
use super::types::StoreError;

impl FeedStore {
    // ========================================================================
    // Feed Size Operations
    // ========================================================================

    /// Record the last known size for a feed, replacing any previous value.
    /// Failures are logged, never returned.
    pub async fn set_feed_size(&self, feed_id: i64, size: i64) {
        if let Err(e) = self.upsert_feed_size(feed_id, size).await {
            tracing::warn!(feed_id, size, error = %e, "Failed to record feed size");
        }
    }

    async fn upsert_feed_size(&self, feed_id: i64, size: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO feed_sizes (feed_id, size)
            VALUES (?, ?)
            ON CONFLICT(feed_id) DO UPDATE SET size = excluded.size
        "#,
        )
        .bind(feed_id)
        .bind(size)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Last known size per feed id. Empty on error.
    pub async fn get_feed_sizes(&self) -> HashMap<i64, i64> {
        let rows = match sqlx::query("SELECT feed_id, size FROM feed_sizes")
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load feed sizes");
                return HashMap::new();
            }
        };

        rows.iter()
            .filter_map(|row| {
                match (row.try_get::<i64, _>("feed_id"), row.try_get::<i64, _>("size")) {
                    (Ok(feed_id), Ok(size)) => Some((feed_id, size)),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!(error = %e, "Skipping undecodable feed size row");
                        None
                    }
                }
            })
            .collect()
    }
}
