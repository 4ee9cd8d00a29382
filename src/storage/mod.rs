mod feed_errors;
mod feed_sizes;
mod feeds;
mod folders;
mod schema;
mod types;

pub use schema::FeedStore;
pub use types::{Feed, Folder, NewFeed, StoreError, DEFAULT_CUSTOM_ORDER};
