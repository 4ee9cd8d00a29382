//! Persistence for a feed aggregator: subscribed feeds, their folders, and
//! the per-feed error and size side tables, backed by SQLite.
//!
//! ```no_run
//! # async fn demo() -> Result<(), feedstore::storage::StoreError> {
//! use feedstore::storage::{FeedStore, NewFeed};
//!
//! let store = FeedStore::open("feeds.db").await?;
//! if let Some(feed) = store.create_feed(&NewFeed::new("https://example.com/rss")).await {
//!     store.set_feed_size(feed.id, 4096).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod storage;
