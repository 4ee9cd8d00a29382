use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage errors.
///
/// Public `FeedStore` methods mostly collapse these into `bool`/`Option`/empty
/// collections after logging; the typed variant is kept for the few call
/// sites (and tests) that need to tell "missing" apart from "broken".
#[derive(Debug, Error)]
pub enum StoreError {
    /// A single-row lookup matched nothing
    #[error("Feed not found")]
    NotFound,

    /// Another process holds the database lock
    #[error("Another process appears to be using the database. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, mapping lock contention and missing rows to
    /// their own variants.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound;
        }

        if is_lock_error(&err.to_string()) {
            return StoreError::InstanceLocked;
        }

        StoreError::Database(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface
/// with these messages.
pub(crate) fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// Log a failed write and collapse it to the `bool` callers check.
pub(crate) fn report(action: &'static str, id: i64, result: Result<(), StoreError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(id, error = %e, "Failed to {}", action);
            false
        }
    }
}

// ============================================================================
// Constants
// ============================================================================

/// Custom order assigned when none is supplied.
///
/// The column is NOT NULL so ORDER BY never mixes null and non-null values.
/// OPML imports carry their own order tokens; everything else gets this one.
pub const DEFAULT_CUSTOM_ORDER: &str = "xxxxxxxxx";

// ============================================================================
// Input Types
// ============================================================================

/// Input for [`FeedStore::create_feed`](super::FeedStore::create_feed).
#[derive(Debug, Clone, Default)]
pub struct NewFeed {
    pub title: String,
    pub description: String,
    pub link: String,
    pub feed_link: String,
    pub custom_order: String,
    pub folder_id: Option<i64>,
}

impl NewFeed {
    pub fn new(feed_link: impl Into<String>) -> Self {
        Self {
            feed_link: feed_link.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn with_custom_order(mut self, custom_order: impl Into<String>) -> Self {
        self.custom_order = custom_order.into();
        self
    }

    pub fn in_folder(mut self, folder_id: Option<i64>) -> Self {
        self.folder_id = folder_id;
        self
    }

    /// Apply the insert defaults: an empty title becomes the feed URL and an
    /// empty custom order becomes [`DEFAULT_CUSTOM_ORDER`].
    pub fn normalized(&self) -> NewFeed {
        let mut feed = self.clone();
        if feed.title.is_empty() {
            feed.title = feed.feed_link.clone();
        }
        if feed.custom_order.is_empty() {
            feed.custom_order = DEFAULT_CUSTOM_ORDER.to_string();
        }
        feed
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed record.
///
/// `icon` is only populated by single-feed reads; listings report presence
/// through `has_icon` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feed {
    pub id: i64,
    pub folder_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub link: String,
    pub feed_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Vec<u8>>,
    pub has_icon: bool,
    pub custom_order: String,
}

/// Folder record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Folder {
    pub id: i64,
    pub title: String,
    pub is_expanded: bool,
}
