use blog_aggregator::{types::*, FeedStore, Fetcher, PgStore, Scheduler, TickOutcome};
use chrono::{Duration as ChronoDuration, Utc};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Integration</title>
    <link>https://example.com</link>
    <description>Integration feed</description>
    <item>
      <title>Dated</title>
      <link>https://example.com/dated</link>
      <description>Has a date</description>
      <pubDate>2024-03-15T08:30:00Z</pubDate>
    </item>
    <item>
      <title>Undated</title>
      <link>https://example.com/undated</link>
      <description></description>
      <pubDate></pubDate>
    </item>
  </channel>
</rss>"#;

/// Connects to `DATABASE_URL` and wipes all rows. `None` when the variable
/// is not set, so the test is skipped on machines without PostgreSQL.
async fn clean_store() -> Option<PgStore> {
    let database_url = env::var("DATABASE_URL").ok()?;

    let store = PgStore::new(&database_url)
        .await
        .expect("DATABASE_URL is set but unreachable");
    store.migrate().await.expect("migrations failed");
    store.reset_users().await.expect("reset failed");
    Some(store)
}

/// Runs as one test because the feed ordering is global to the database.
#[tokio::test]
async fn test_postgres_scrape_cycle() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let Some(store) = clean_store().await else {
        info!("DATABASE_URL not set, skipping PostgreSQL test");
        return;
    };

    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", mockito::Matcher::Any)
        .with_status(200)
        .with_body(FEED)
        .create_async()
        .await;

    // Users and follows
    let user = store.create_user("kahya").await.unwrap();
    assert!(store.create_user("kahya").await.unwrap_err().is_duplicate());
    assert_eq!(store.get_user("kahya").await.unwrap().id, user.id);
    assert!(matches!(store.get_user("nobody").await, Err(StoreError::NotFound)));

    let a = store.create_feed("a", &format!("{}/a", server.url()), user.id).await.unwrap();
    let b = store.create_feed("b", &format!("{}/b", server.url()), user.id).await.unwrap();
    let c = store.create_feed("c", &format!("{}/c", server.url()), user.id).await.unwrap();
    assert!(store
        .create_feed("dup", &a.url, user.id)
        .await
        .unwrap_err()
        .is_duplicate());

    for feed in [&a, &b, &c] {
        store.create_feed_follow(user.id, feed.id).await.unwrap();
    }
    assert_eq!(store.feed_follows_for_user(user.id).await.unwrap().len(), 3);
    assert_eq!(store.list_feeds().await.unwrap()[0].user_name, "kahya");

    // A fetched an hour ago, B never, C five minutes ago
    let now = Utc::now();
    for (feed, at) in [(&a, now - ChronoDuration::hours(1)), (&c, now - ChronoDuration::minutes(5))] {
        sqlx::query("UPDATE feeds SET last_fetched_at = $1 WHERE id = $2")
            .bind(at)
            .bind(feed.id)
            .execute(store.pool())
            .await
            .unwrap();
    }

    assert_eq!(store.next_feed_to_fetch().await.unwrap().id, b.id);

    let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
    let scheduler = Scheduler::new(Arc::new(store.clone()), fetcher, Duration::from_secs(30)).unwrap();

    let mut visited = Vec::new();
    for _ in 0..3 {
        match scheduler.run_scrape_tick().await {
            TickOutcome::Ingested { feed_id, report } => {
                assert_eq!(report.failed, 0);
                visited.push(feed_id);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(visited, vec![b.id, a.id, c.id]);

    // Second round for B inserts nothing new
    match scheduler.run_scrape_tick().await {
        TickOutcome::Ingested { feed_id, report } => {
            assert_eq!(feed_id, b.id);
            assert_eq!(report.inserted, 0);
            assert_eq!(report.duplicates, 2);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let posts = store.posts_for_user(user.id, 100).await.unwrap();
    assert_eq!(posts.len(), 6);
    assert!(posts[0].published_at.is_some());
    assert!(posts.iter().filter(|p| p.published_at.is_none()).all(|p| p.description.is_none()));

    store.delete_feed_follow(user.id, a.id).await.unwrap();
    assert!(matches!(
        store.delete_feed_follow(user.id, a.id).await,
        Err(StoreError::NotFound)
    ));
    assert_eq!(store.posts_for_user(user.id, 100).await.unwrap().len(), 4);

    store.reset_users().await.unwrap();
    assert!(matches!(store.next_feed_to_fetch().await, Err(StoreError::NotFound)));
    info!("PostgreSQL scrape cycle test completed");
}
