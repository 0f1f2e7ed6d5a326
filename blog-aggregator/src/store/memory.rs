use crate::store::FeedStore;
use crate::types::{Feed, NewPost, Post, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process store with the same ordering and uniqueness rules as
/// [`PgStore`](crate::store::PgStore).
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    feeds: Vec<Feed>,
    posts: Vec<Post>,
}

impl Tables {
    fn next_feed(&self) -> Option<&Feed> {
        self.feeds.iter().min_by_key(|feed| {
            (
                feed.last_fetched_at.is_some(),
                feed.last_fetched_at,
                feed.created_at,
                feed.id,
            )
        })
    }

    fn mark_fetched(&mut self, feed_id: Uuid) -> Result<(), StoreError> {
        let feed = self
            .feeds
            .iter_mut()
            .find(|feed| feed.id == feed_id)
            .ok_or(StoreError::NotFound)?;

        let now = Utc::now();
        feed.last_fetched_at = Some(now);
        feed.updated_at = now;
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a never-fetched feed owned by a random user.
    pub async fn add_feed(&self, name: &str, url: &str) -> Result<Feed, StoreError> {
        let now = Utc::now();
        self.insert_feed(Feed {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            url: url.to_string(),
            user_id: Uuid::new_v4(),
            last_fetched_at: None,
        })
        .await
    }

    /// Adds a feed as given, enforcing URL uniqueness.
    pub async fn insert_feed(&self, feed: Feed) -> Result<Feed, StoreError> {
        let mut tables = self.inner.write().await;
        if tables.feeds.iter().any(|existing| existing.url == feed.url) {
            return Err(StoreError::DuplicateKey {
                constraint: "feeds_url_key".to_string(),
            });
        }

        tables.feeds.push(feed.clone());
        Ok(feed)
    }

    pub async fn feed(&self, feed_id: Uuid) -> Option<Feed> {
        let tables = self.inner.read().await;
        tables.feeds.iter().find(|feed| feed.id == feed_id).cloned()
    }

    pub async fn set_last_fetched_at(&self, feed_id: Uuid, at: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        let mut tables = self.inner.write().await;
        let feed = tables
            .feeds
            .iter_mut()
            .find(|feed| feed.id == feed_id)
            .ok_or(StoreError::NotFound)?;

        feed.last_fetched_at = at;
        Ok(())
    }

    /// Posts of one feed in insertion order.
    pub async fn posts_for_feed(&self, feed_id: Uuid) -> Vec<Post> {
        let tables = self.inner.read().await;
        tables
            .posts
            .iter()
            .filter(|post| post.feed_id == feed_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn next_feed_to_fetch(&self) -> Result<Feed, StoreError> {
        let tables = self.inner.read().await;
        tables.next_feed().cloned().ok_or(StoreError::NotFound)
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), StoreError> {
        self.inner.write().await.mark_fetched(feed_id)
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut tables = self.inner.write().await;

        let duplicate = tables
            .posts
            .iter()
            .any(|existing| existing.feed_id == post.feed_id && existing.url == post.url);
        if duplicate {
            return Err(StoreError::DuplicateKey {
                constraint: "posts_feed_id_url_key".to_string(),
            });
        }

        if !tables.feeds.iter().any(|feed| feed.id == post.feed_id) {
            return Err(StoreError::NotFound);
        }

        let now = Utc::now();
        let created = Post {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            title: post.title,
            url: post.url,
            description: post.description,
            published_at: post.published_at,
            feed_id: post.feed_id,
        };
        tables.posts.push(created.clone());
        Ok(created)
    }

    async fn claim_next_feed(&self) -> Result<Feed, StoreError> {
        let mut tables = self.inner.write().await;
        let feed = tables.next_feed().cloned().ok_or(StoreError::NotFound)?;
        tables.mark_fetched(feed.id)?;
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn next_feed_prefers_never_fetched_then_oldest() {
        let store = MemoryStore::new();
        let a = store.add_feed("a", "https://a.example/rss").await.unwrap();
        let b = store.add_feed("b", "https://b.example/rss").await.unwrap();
        let now = Utc::now();
        store.set_last_fetched_at(a.id, Some(now - Duration::hours(1))).await.unwrap();
        store.set_last_fetched_at(b.id, Some(now - Duration::hours(2))).await.unwrap();
        let c = store.add_feed("c", "https://c.example/rss").await.unwrap();

        assert_eq!(store.next_feed_to_fetch().await.unwrap().id, c.id);
        store.mark_feed_fetched(c.id).await.unwrap();
        assert_eq!(store.next_feed_to_fetch().await.unwrap().id, b.id);
    }

    fn feed_at(id: u128, created_at: DateTime<Utc>, last_fetched_at: Option<DateTime<Utc>>) -> Feed {
        Feed {
            id: Uuid::from_u128(id),
            created_at,
            updated_at: created_at,
            name: format!("feed-{}", id),
            url: format!("https://{}.example/rss", id),
            user_id: Uuid::new_v4(),
            last_fetched_at,
        }
    }

    #[tokio::test]
    async fn ties_are_broken_by_created_at_then_id() {
        let store = MemoryStore::new();
        let t0 = Utc::now() - Duration::days(1);
        let t1 = t0 + Duration::minutes(1);
        let fetched = Utc::now() - Duration::hours(1);

        // Inserted out of order so the result does not depend on insertion.
        for feed in [
            feed_at(5, t1, Some(fetched)),
            feed_at(3, t1, None),
            feed_at(4, t0, Some(fetched)),
            feed_at(2, t1, None),
            feed_at(6, t0, Some(fetched)),
            feed_at(1, t0 + Duration::minutes(5), None),
        ] {
            store.insert_feed(feed).await.unwrap();
        }

        let mut claimed = Vec::new();
        for _ in 0..6 {
            claimed.push(store.claim_next_feed().await.unwrap().id.as_u128());
        }

        assert_eq!(claimed, vec![2, 3, 1, 4, 6, 5]);
    }

    #[tokio::test]
    async fn empty_store_has_no_next_feed() {
        let store = MemoryStore::new();
        assert!(matches!(store.next_feed_to_fetch().await, Err(StoreError::NotFound)));
        assert!(matches!(store.claim_next_feed().await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn feed_urls_are_unique() {
        let store = MemoryStore::new();
        store.add_feed("a", "https://a.example/rss").await.unwrap();
        let err = store.add_feed("again", "https://a.example/rss").await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn duplicate_post_is_rejected_per_feed() {
        let store = MemoryStore::new();
        let a = store.add_feed("a", "https://a.example/rss").await.unwrap();
        let b = store.add_feed("b", "https://b.example/rss").await.unwrap();
        let post = |feed_id| NewPost {
            feed_id,
            title: "Hello".to_string(),
            url: "https://example.com/hello".to_string(),
            description: None,
            published_at: None,
        };

        store.create_post(post(a.id)).await.unwrap();
        assert!(store.create_post(post(a.id)).await.unwrap_err().is_duplicate());
        store.create_post(post(b.id)).await.unwrap();

        assert_eq!(store.posts_for_feed(a.id).await.len(), 1);
        assert_eq!(store.posts_for_feed(b.id).await.len(), 1);
    }
}
