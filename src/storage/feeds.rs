use futures::StreamExt;
use sqlx::{sqlite::SqliteRow, Row};

use super::schema::FeedStore;
use super::types::{report, Feed, NewFeed, StoreError};

/// Decode a listing row. Listings never carry the icon blob.
fn feed_from_listing_row(row: &SqliteRow) -> Result<Feed, sqlx::Error> {
    Ok(Feed {
        id: row.try_get("id")?,
        folder_id: row.try_get("folder_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        link: row.try_get("link")?,
        feed_link: row.try_get("feed_link")?,
        icon: None,
        has_icon: row.try_get("has_icon")?,
        custom_order: row.try_get("custom_order")?,
    })
}

impl FeedStore {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Subscribe to a feed, or move an existing subscription.
    ///
    /// An empty title falls back to the feed URL and an empty custom order to
    /// [`DEFAULT_CUSTOM_ORDER`](super::DEFAULT_CUSTOM_ORDER). If `feed_link`
    /// is already stored only its folder is updated; the existing title,
    /// description, link and custom order stay as they were.
    ///
    /// The returned feed echoes the (normalized) input with the resulting id.
    /// It is not re-read, so on the conflict path it reports the input's
    /// fields rather than the stored ones. `None` on any store error.
    pub async fn create_feed(&self, new_feed: &NewFeed) -> Option<Feed> {
        let feed = new_feed.normalized();
        match self.upsert_feed(&feed).await {
            Ok(id) => Some(Feed {
                id,
                folder_id: feed.folder_id,
                title: feed.title,
                description: feed.description,
                link: feed.link,
                feed_link: feed.feed_link,
                icon: None,
                has_icon: false,
                custom_order: feed.custom_order,
            }),
            Err(e) => {
                tracing::warn!(feed_link = %feed.feed_link, error = %e, "Failed to create feed");
                None
            }
        }
    }

    async fn upsert_feed(&self, feed: &NewFeed) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (title, description, link, feed_link, folder_id, custom_order)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_link) DO UPDATE SET folder_id = excluded.folder_id
            RETURNING id
        "#,
        )
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(&feed.link)
        .bind(&feed.feed_link)
        .bind(feed.folder_id)
        .bind(&feed.custom_order)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Delete a feed. `true` only if exactly one row was removed.
    ///
    /// Side-table rows go with it through the schema's `ON DELETE CASCADE`.
    pub async fn delete_feed(&self, feed_id: i64) -> bool {
        match self.execute_delete_feed(feed_id).await {
            Ok(rows) => rows == 1,
            Err(e) => {
                tracing::warn!(feed_id, error = %e, "Failed to delete feed");
                false
            }
        }
    }

    async fn execute_delete_feed(&self, feed_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Set a feed's title.
    ///
    /// Reports success whenever the statement runs, including when no feed
    /// has this id.
    pub async fn rename_feed(&self, feed_id: i64, title: &str) -> bool {
        let result = self
            .update_feed_column("UPDATE feeds SET title = ? WHERE id = ?", feed_id, title)
            .await;
        report("rename feed", feed_id, result)
    }

    /// Move a feed into a folder, or unfile it with `None`.
    pub async fn update_feed_folder(&self, feed_id: i64, folder_id: Option<i64>) -> bool {
        let result = self
            .update_feed_column(
                "UPDATE feeds SET folder_id = ? WHERE id = ?",
                feed_id,
                folder_id,
            )
            .await;
        report("update feed folder", feed_id, result)
    }

    /// Point a feed at a new retrieval URL.
    pub async fn update_feed_link(&self, feed_id: i64, feed_link: &str) -> bool {
        let result = self
            .update_feed_column(
                "UPDATE feeds SET feed_link = ? WHERE id = ?",
                feed_id,
                feed_link,
            )
            .await;
        report("update feed link", feed_id, result)
    }

    /// Store an icon, or clear it to NULL with `None`.
    ///
    /// `Some(&[])` stores a zero-length blob, which is not the same as
    /// clearing: see [`list_feeds_missing_icons`](Self::list_feeds_missing_icons).
    pub async fn update_feed_icon(&self, feed_id: i64, icon: Option<&[u8]>) -> bool {
        let result = self
            .update_feed_column("UPDATE feeds SET icon = ? WHERE id = ?", feed_id, icon)
            .await;
        report("update feed icon", feed_id, result)
    }

    async fn update_feed_column<'q, T>(
        &self,
        sql: &'q str,
        feed_id: i64,
        value: T,
    ) -> Result<(), StoreError>
    where
        T: 'q + Send + sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        sqlx::query(sql)
            .bind(value)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All feeds ordered by title, case-insensitively.
    ///
    /// `has_icon` is true only for a non-empty icon blob. The icon itself is
    /// not loaded. Errors never surface: a failed query yields an empty list,
    /// a failure part-way through yields the feeds read before it.
    pub async fn list_feeds(&self) -> Vec<Feed> {
        self.collect_feeds(
            r#"
            SELECT id, folder_id, title, description, link, feed_link,
                   IFNULL(LENGTH(icon), 0) > 0 AS has_icon, custom_order
            FROM feeds
            ORDER BY title COLLATE NOCASE
        "#,
        )
        .await
    }

    /// Feeds whose icon is NULL, i.e. never fetched or explicitly cleared.
    ///
    /// A zero-length icon is not NULL, so those feeds are left out here even
    /// though [`list_feeds`](Self::list_feeds) reports them without an icon.
    pub async fn list_feeds_missing_icons(&self) -> Vec<Feed> {
        self.collect_feeds(
            r#"
            SELECT id, folder_id, title, description, link, feed_link,
                   0 AS has_icon, custom_order
            FROM feeds
            WHERE icon IS NULL
        "#,
        )
        .await
    }

    async fn collect_feeds(&self, sql: &str) -> Vec<Feed> {
        let mut feeds = Vec::new();
        let mut rows = sqlx::query(sql).fetch(&self.pool);

        while let Some(row) = rows.next().await {
            let feed = match row {
                Ok(row) => feed_from_listing_row(&row),
                Err(e) => Err(e),
            };
            match feed {
                Ok(feed) => feeds.push(feed),
                Err(e) => {
                    tracing::warn!(error = %e, collected = feeds.len(), "Feed listing stopped early");
                    break;
                }
            }
        }

        feeds
    }

    /// Fetch one feed including its icon. `None` if missing or on error;
    /// only the latter is logged.
    pub async fn get_feed(&self, feed_id: i64) -> Option<Feed> {
        match self.fetch_feed(feed_id).await {
            Ok(feed) => Some(feed),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                tracing::warn!(feed_id, error = %e, "Failed to load feed");
                None
            }
        }
    }

    /// Fetch one feed including its icon.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if no feed has this id.
    pub async fn fetch_feed(&self, feed_id: i64) -> Result<Feed, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, folder_id, title, description, link, feed_link, icon, custom_order
            FROM feeds
            WHERE id = ?
        "#,
        )
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        let icon: Option<Vec<u8>> = row.try_get("icon")?;
        Ok(Feed {
            id: row.try_get("id")?,
            folder_id: row.try_get("folder_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            link: row.try_get("link")?,
            feed_link: row.try_get("feed_link")?,
            has_icon: icon.as_ref().is_some_and(|icon| !icon.is_empty()),
            icon,
            custom_order: row.try_get("custom_order")?,
        })
    }
}
