use crate::store::FeedStore;
use crate::types::{
    Feed, FeedFollow, FeedWithOwner, FollowedFeed, NewPost, Post, StoreError, User,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

/// PostgreSQL-backed store. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let db = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { db })
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Migrate(Box::new(e))))?;

        debug!("Database migrations applied");
        Ok(())
    }

    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, created_at, updated_at, name)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, updated_at, name
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        info!("Created user {} with ID: {}", user.name, user.id);
        Ok(user)
    }

    pub async fn get_user(&self, name: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, created_at, updated_at, name FROM users WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, created_at, updated_at, name FROM users ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// Deletes every user. Feeds, follows and posts go with them.
    pub async fn reset_users(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.db).await?;

        info!("Deleted {} users", result.rows_affected());
        Ok(result.rows_affected())
    }

    pub async fn create_feed(&self, name: &str, url: &str, user_id: Uuid) -> Result<Feed, StoreError> {
        let now = Utc::now();

        let feed = sqlx::query_as::<_, Feed>(
            r#"
            INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, created_at, updated_at, name, url, user_id, last_fetched_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(url)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        info!("Added new feed: {} with ID: {}", feed.url, feed.id);
        Ok(feed)
    }

    pub async fn list_feeds(&self) -> Result<Vec<FeedWithOwner>, StoreError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT feeds.name, feeds.url, users.name AS user_name
            FROM feeds
            JOIN users ON users.id = feeds.user_id
            ORDER BY feeds.created_at
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(feeds)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    pub async fn create_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<FeedFollow, StoreError> {
        let now = Utc::now();

        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            INSERT INTO feed_follows (id, created_at, updated_at, user_id, feed_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, created_at, updated_at, user_id, feed_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(feed_id)
        .fetch_one(&self.db)
        .await?;

        Ok(follow)
    }

    pub async fn feed_follows_for_user(&self, user_id: Uuid) -> Result<Vec<FollowedFeed>, StoreError> {
        let follows = sqlx::query_as::<_, FollowedFeed>(
            r#"
            SELECT feeds.name AS feed_name, feeds.url AS feed_url
            FROM feed_follows
            JOIN feeds ON feeds.id = feed_follows.feed_id
            WHERE feed_follows.user_id = $1
            ORDER BY feed_follows.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(follows)
    }

    pub async fn delete_feed_follow(&self, user_id: Uuid, feed_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = $1 AND feed_id = $2")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Newest posts from the feeds a user follows. Undated posts sort last.
    pub async fn posts_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT posts.id, posts.created_at, posts.updated_at, posts.title, posts.url,
                   posts.description, posts.published_at, posts.feed_id
            FROM posts
            JOIN feed_follows ON feed_follows.feed_id = posts.feed_id
            WHERE feed_follows.user_id = $1
            ORDER BY posts.published_at DESC NULLS LAST, posts.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(posts)
    }
}

#[async_trait]
impl FeedStore for PgStore {
    async fn next_feed_to_fetch(&self) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<(), StoreError> {
        let now = Utc::now();

        let result = sqlx::query("UPDATE feeds SET last_fetched_at = $1, updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(feed_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let now = Utc::now();

        let created = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, created_at, updated_at, title, url, description, published_at, feed_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (feed_id, url) DO NOTHING
            RETURNING id, created_at, updated_at, title, url, description, published_at, feed_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(post.feed_id)
        .fetch_optional(&self.db)
        .await?;

        created.ok_or_else(|| StoreError::DuplicateKey {
            constraint: "posts_feed_id_url_key".to_string(),
        })
    }

    /// Select and mark in one statement. `SKIP LOCKED` keeps concurrent
    /// schedulers from claiming the same row.
    async fn claim_next_feed(&self) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(
            r#"
            WITH next AS (
                SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
                FROM feeds
                ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE feeds
            SET last_fetched_at = NOW(), updated_at = NOW()
            FROM next
            WHERE feeds.id = next.id
            RETURNING next.id, next.created_at, next.updated_at, next.name, next.url,
                      next.user_id, next.last_fetched_at
            "#,
        )
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }
}
