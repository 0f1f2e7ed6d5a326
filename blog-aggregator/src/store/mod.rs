pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::types::{Feed, NewPost, Post, StoreError};
use async_trait::async_trait;
use uuid::Uuid;

/// Storage capability consumed by the scraping scheduler and the ingestion
/// pipeline.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The feed with the oldest `last_fetched_at`, never-fetched feeds first.
    /// Ties are broken by creation time, then id. `StoreError::NotFound`
    /// when no feeds exist.
    async fn next_feed_to_fetch(&self) -> Result<Feed, StoreError>;

    /// Sets `last_fetched_at` (and `updated_at`) to now.
    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), StoreError>;

    /// Inserts a post. An existing `(feed_id, url)` pair yields
    /// `StoreError::DuplicateKey` and leaves the stored post untouched.
    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError>;

    /// Selects the next feed and marks it fetched, returning the feed as it
    /// was before the mark.
    ///
    /// Stores shared by several scheduler processes must override this with a
    /// single atomic statement.
    async fn claim_next_feed(&self) -> Result<Feed, StoreError> {
        let feed = self.next_feed_to_fetch().await?;
        self.mark_feed_fetched(feed.id).await?;
        Ok(feed)
    }
}
