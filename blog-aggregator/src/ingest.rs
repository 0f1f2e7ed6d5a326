use crate::dates::resolve_published_at;
use crate::store::FeedStore;
use crate::types::{FeedItem, NewPost, StoreError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Per-batch counts from [`ingest_items`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Items stored or attempted without a published time.
    pub undated: usize,
}

impl IngestReport {
    pub fn attempted(&self) -> usize {
        self.inserted + self.duplicates + self.failed
    }
}

/// Turns one feed item into insert parameters. An empty description counts
/// as no description.
pub fn new_post_from_item(feed_id: Uuid, item: &FeedItem) -> NewPost {
    NewPost {
        feed_id,
        title: item.title.clone(),
        url: item.link.clone(),
        description: item.description.clone().filter(|d| !d.is_empty()),
        published_at: resolve_published_at(item.pub_date.as_deref()),
    }
}

/// Stores every item of a fetched feed as a post.
///
/// Each insert stands alone and must finish within `deadline`. Duplicates are
/// skipped silently; other storage errors and timeouts are logged and counted
/// as failures without stopping the batch.
pub async fn ingest_items<S>(
    store: &S,
    feed_id: Uuid,
    items: &[FeedItem],
    deadline: Duration,
) -> IngestReport
where
    S: FeedStore + ?Sized,
{
    let mut report = IngestReport::default();

    for item in items {
        let post = new_post_from_item(feed_id, item);
        if post.published_at.is_none() {
            report.undated += 1;
        }

        let result = match timeout(deadline, store.create_post(post)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Storing post {} for feed {} timed out after {:?}",
                    item.link, feed_id, deadline
                );
                report.failed += 1;
                continue;
            }
        };

        match result {
            Ok(created) => {
                debug!("Stored post {} ({})", created.id, created.url);
                report.inserted += 1;
            }
            Err(StoreError::DuplicateKey { .. }) => {
                debug!("Skipping already stored post {}", item.link);
                report.duplicates += 1;
            }
            Err(e) => {
                error!("Failed to store post {} for feed {}: {}", item.link, feed_id, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Feed {}: {} items, {} new, {} duplicates, {} failed",
        feed_id,
        items.len(),
        report.inserted,
        report.duplicates,
        report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    const DEADLINE: Duration = Duration::from_secs(5);

    fn item(link: &str, pub_date: Option<&str>) -> FeedItem {
        FeedItem {
            title: format!("Title for {}", link),
            link: link.to_string(),
            description: Some(String::new()),
            pub_date: pub_date.map(|s| s.to_string()),
        }
    }

    #[test]
    fn builds_post_from_item() {
        let feed_id = Uuid::new_v4();
        let mut source = item("https://example.com/a", Some("Mon, 02 Jan 2006 15:04:05 -0700"));
        let post = new_post_from_item(feed_id, &source);

        assert_eq!(post.feed_id, feed_id);
        assert_eq!(post.url, "https://example.com/a");
        assert_eq!(post.description, None);
        assert_eq!(
            post.published_at,
            Some(Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap())
        );

        source.description = Some("body".to_string());
        source.pub_date = Some("garbage".to_string());
        let post = new_post_from_item(feed_id, &source);
        assert_eq!(post.description.as_deref(), Some("body"));
        assert_eq!(post.published_at, None);
    }

    #[tokio::test]
    async fn second_pass_inserts_nothing() {
        let store = MemoryStore::new();
        let feed = store.add_feed("blog", "https://example.com/rss").await.unwrap();
        let items = vec![
            item("https://example.com/1", Some("2024-03-15T08:30:00Z")),
            item("https://example.com/2", None),
            item("https://example.com/1", Some("2024-03-15T08:30:00Z")),
        ];

        let first = ingest_items(&store, feed.id, &items, DEADLINE).await;
        assert_eq!(first.inserted, 2);
        assert_eq!(first.duplicates, 1);

        let second = ingest_items(&store, feed.id, &items, DEADLINE).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(second.failed, 0);

        assert_eq!(store.posts_for_feed(feed.id).await.len(), 2);
    }

    #[tokio::test]
    async fn undated_items_are_still_stored() {
        let store = MemoryStore::new();
        let feed = store.add_feed("blog", "https://example.com/rss").await.unwrap();
        let items = vec![
            item("https://example.com/dated", Some("2024-03-15T08:30:00Z")),
            item("https://example.com/empty", Some("")),
            item("https://example.com/bad", Some("last tuesday")),
        ];

        let report = ingest_items(&store, feed.id, &items, DEADLINE).await;
        assert_eq!(report.inserted, 3);
        assert_eq!(report.undated, 2);

        let posts = store.posts_for_feed(feed.id).await;
        assert!(posts[0].published_at.is_some());
        assert!(posts[1].published_at.is_none());
        assert!(posts[2].published_at.is_none());
    }
}
