use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
}

/// A subscribed feed. `last_fetched_at` is the scheduler's cursor: the feed
/// with the oldest (or null) value is polled next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Feed listing row joined with the owner's name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedWithOwner {
    pub name: String,
    pub url: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub feed_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowedFeed {
    pub feed_name: String,
    pub feed_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub feed_id: Uuid,
}

/// Insert parameters for a post. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub feed_id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// One entry of a fetched feed document. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub pub_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub accept: String,
    pub timeout: Duration,
    pub max_feed_size_mb: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("gator/{}", env!("CARGO_PKG_VERSION")),
            accept: "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.8"
                .to_string(),
            timeout: Duration::from_secs(10),
            max_feed_size_mb: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate key violates unique constraint {constraint}")]
    DuplicateKey { constraint: String },

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateKey {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                }
            }
            other => StoreError::Database(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("failed to fetch feed {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("unsupported date format: {0}")]
    UnsupportedDateFormat(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Usage(String),

    #[error("no user logged in")]
    NotLoggedIn,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for AggregatorError {
    fn from(err: sqlx::Error) -> Self {
        AggregatorError::Store(StoreError::from(err))
    }
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
