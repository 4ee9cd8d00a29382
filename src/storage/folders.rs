use super::schema::FeedStore;
use super::types::{report, Folder, StoreError};

impl FeedStore {
    // ========================================================================
    // Folder Operations
    // ========================================================================

    /// Strip control characters and surrounding whitespace from a folder
    /// title. `None` if nothing is left.
    fn sanitize_folder_title(title: &str) -> Option<String> {
        let cleaned: String = title.chars().filter(|c| !c.is_control()).collect();
        let trimmed = cleaned.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }

    /// Create a folder, or return the existing one with the same title.
    ///
    /// `None` for a blank title or on a store error.
    pub async fn create_folder(&self, title: &str) -> Option<Folder> {
        let Some(title) = Self::sanitize_folder_title(title) else {
            tracing::warn!("Refusing to create folder with a blank title");
            return None;
        };

        match self.upsert_folder(&title).await {
            Ok(folder) => Some(folder),
            Err(e) => {
                tracing::warn!(title = %title, error = %e, "Failed to create folder");
                None
            }
        }
    }

    async fn upsert_folder(&self, title: &str) -> Result<Folder, StoreError> {
        let row: (i64, bool) = sqlx::query_as(
            r#"
            INSERT INTO folders (title, is_expanded)
            VALUES (?, 1)
            ON CONFLICT(title) DO UPDATE SET title = excluded.title
            RETURNING id, is_expanded
        "#,
        )
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        Ok(Folder {
            id: row.0,
            title: title.to_owned(),
            is_expanded: row.1,
        })
    }

    /// Rename a folder. `false` for a blank title or on error (including a
    /// title already taken by another folder).
    pub async fn rename_folder(&self, folder_id: i64, title: &str) -> bool {
        let Some(title) = Self::sanitize_folder_title(title) else {
            return false;
        };

        let result = self
            .execute_folder_write("UPDATE folders SET title = ? WHERE id = ?", folder_id, title)
            .await
            .map(drop);
        report("rename folder", folder_id, result)
    }

    /// Record whether a folder is shown expanded.
    pub async fn toggle_folder_expanded(&self, folder_id: i64, is_expanded: bool) -> bool {
        let result = self
            .execute_folder_write(
                "UPDATE folders SET is_expanded = ? WHERE id = ?",
                folder_id,
                is_expanded,
            )
            .await
            .map(drop);
        report("update folder state", folder_id, result)
    }

    /// Delete a folder. Its feeds become unfiled through `ON DELETE SET NULL`.
    ///
    /// `true` only if exactly one folder was removed.
    pub async fn delete_folder(&self, folder_id: i64) -> bool {
        let result = self.execute_delete_folder(folder_id).await;
        let removed = *result.as_ref().unwrap_or(&0);
        report("delete folder", folder_id, result.map(drop)) && removed == 1
    }

    async fn execute_delete_folder(&self, folder_id: i64) -> Result<u64, StoreError> {
        let done = sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(folder_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Run a single-value folder update, returning the affected row count.
    async fn execute_folder_write<'q, T>(
        &self,
        sql: &'q str,
        folder_id: i64,
        value: T,
    ) -> Result<u64, StoreError>
    where
        T: 'q + Send + sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        let done = sqlx::query(sql)
            .bind(value)
            .bind(folder_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// All folders ordered by title, case-insensitively. Empty on error.
    pub async fn list_folders(&self) -> Vec<Folder> {
        let rows: Result<Vec<(i64, String, bool)>, sqlx::Error> = sqlx::query_as(
            "SELECT id, title, is_expanded FROM folders ORDER BY title COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await;

        match rows {
            Ok(rows) => rows
                .into_iter()
                .map(|(id, title, is_expanded)| Folder {
                    id,
                    title,
                    is_expanded,
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list folders");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{FeedStore, NewFeed};
    use pretty_assertions::assert_eq;

    async fn test_store() -> FeedStore {
        FeedStore::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_folder() {
        let store = test_store().await;

        let folder = store.create_folder("Tech").await.unwrap();
        assert!(folder.id > 0);
        assert_eq!(folder.title, "Tech");
        assert!(folder.is_expanded);

        let folders = store.list_folders().await;
        assert_eq!(folders, vec![folder]);
    }

    #[tokio::test]
    async fn test_create_folder_same_title_returns_existing() {
        let store = test_store().await;

        let first = store.create_folder("Tech").await.unwrap();
        let second = store.create_folder("Tech").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_folders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_folder_sanitizes_title() {
        let store = test_store().await;

        let folder = store.create_folder("  News\u{1b}\n ").await.unwrap();
        assert_eq!(folder.title, "News");
    }

    #[tokio::test]
    async fn test_create_folder_rejects_blank_title() {
        let store = test_store().await;

        assert!(store.create_folder("   ").await.is_none());
        assert!(store.create_folder("").await.is_none());
        assert!(store.list_folders().await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_folder() {
        let store = test_store().await;
        let folder = store.create_folder("Tech").await.unwrap();

        assert!(store.rename_folder(folder.id, "Technology").await);
        assert_eq!(store.list_folders().await[0].title, "Technology");

        assert!(!store.rename_folder(folder.id, "  ").await);
    }

    #[tokio::test]
    async fn test_rename_folder_to_taken_title_fails() {
        let store = test_store().await;
        store.create_folder("Tech").await.unwrap();
        let news = store.create_folder("News").await.unwrap();

        assert!(!store.rename_folder(news.id, "Tech").await);
    }

    #[tokio::test]
    async fn test_folder_writes_fail_without_table() {
        let store = test_store().await;
        let folder = store.create_folder("Tech").await.unwrap();
        sqlx::query("DROP TABLE feed_errors").execute(&store.pool).await.unwrap();
        sqlx::query("DROP TABLE feed_sizes").execute(&store.pool).await.unwrap();
        sqlx::query("DROP TABLE feeds").execute(&store.pool).await.unwrap();
        sqlx::query("DROP TABLE folders").execute(&store.pool).await.unwrap();

        assert!(!store.rename_folder(folder.id, "Technology").await);
        assert!(!store.toggle_folder_expanded(folder.id, false).await);
        assert!(!store.delete_folder(folder.id).await);
        assert!(store.list_folders().await.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_folder_expanded() {
        let store = test_store().await;
        let folder = store.create_folder("Tech").await.unwrap();

        assert!(store.toggle_folder_expanded(folder.id, false).await);
        assert!(!store.list_folders().await[0].is_expanded);
    }

    #[tokio::test]
    async fn test_list_folders_ordered_case_insensitive() {
        let store = test_store().await;
        for title in ["beta", "Alpha", "gamma"] {
            store.create_folder(title).await.unwrap();
        }

        let titles: Vec<String> = store
            .list_folders()
            .await
            .into_iter()
            .map(|f| f.title)
            .collect();
        assert_eq!(titles, vec!["Alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_delete_folder_unfiles_feeds() {
        let store = test_store().await;
        let folder = store.create_folder("Tech").await.unwrap();
        let feed = store
            .create_feed(&NewFeed::new("https://example.com/rss").in_folder(Some(folder.id)))
            .await
            .unwrap();

        assert!(store.delete_folder(folder.id).await);
        assert!(!store.delete_folder(folder.id).await);

        let stored = store.get_feed(feed.id).await.unwrap();
        assert_eq!(stored.folder_id, None);
    }
}
