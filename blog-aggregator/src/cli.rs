use crate::config::Config;
use crate::fetcher::Fetcher;
use crate::scheduler::Scheduler;
use crate::store::PgStore;
use crate::types::{AggregatorError, FetchConfig, Result, StoreError, User};
use crate::utils::parse_duration;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "gator", version, about = "Aggregate RSS feeds into PostgreSQL")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// Delete all users, feeds, follows and posts
    Reset,
    /// List users
    Users,
    /// Add a feed and follow it
    Addfeed { name: String, url: String },
    /// List every feed
    Feeds,
    /// Follow an existing feed by URL
    Follow { url: String },
    /// List feeds the current user follows
    Following,
    /// Stop following a feed
    Unfollow { url: String },
    /// Poll feeds forever, one per interval (e.g. 30s, 1m)
    Agg { time_between_reqs: String },
    /// Show the newest posts from followed feeds
    Browse {
        #[arg(default_value_t = 2)]
        limit: i64,
    },
}

pub struct AppState {
    pub store: PgStore,
    pub config: Config,
}

pub async fn run(state: &mut AppState, command: Command) -> Result<()> {
    match command {
        Command::Register { name } => handle_register(state, &name).await,
        Command::Login { name } => handle_login(state, &name).await,
        Command::Reset => handle_reset(state).await,
        Command::Users => handle_users(state).await,
        Command::Addfeed { name, url } => {
            let user = logged_in(state).await?;
            handle_add_feed(state, &user, &name, &url).await
        }
        Command::Feeds => handle_feeds(state).await,
        Command::Follow { url } => {
            let user = logged_in(state).await?;
            handle_follow(state, &user, &url).await
        }
        Command::Following => {
            let user = logged_in(state).await?;
            handle_following(state, &user).await
        }
        Command::Unfollow { url } => {
            let user = logged_in(state).await?;
            handle_unfollow(state, &user, &url).await
        }
        Command::Agg { time_between_reqs } => handle_agg(state, &time_between_reqs).await,
        Command::Browse { limit } => {
            let user = logged_in(state).await?;
            handle_browse(state, &user, limit).await
        }
    }
}

/// Resolves the configured current user for commands that need one.
async fn logged_in(state: &AppState) -> Result<User> {
    let name = state.config.current_user().ok_or(AggregatorError::NotLoggedIn)?;

    match state.store.get_user(name).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(AggregatorError::Usage(format!(
            "current user {} no longer exists, log in again",
            name
        ))),
        Err(e) => Err(e.into()),
    }
}

async fn handle_register(state: &mut AppState, name: &str) -> Result<()> {
    let user = match state.store.create_user(name).await {
        Ok(user) => user,
        Err(StoreError::DuplicateKey { .. }) => {
            return Err(AggregatorError::Usage(format!("user {} already exists", name)))
        }
        Err(e) => return Err(e.into()),
    };

    state.config.set_user(&user.name)?;
    println!("User {} created", user.name);
    Ok(())
}

async fn handle_login(state: &mut AppState, name: &str) -> Result<()> {
    let user = match state.store.get_user(name).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(AggregatorError::Usage(format!("user {} does not exist", name)))
        }
        Err(e) => return Err(e.into()),
    };

    state.config.set_user(&user.name)?;
    println!("Logged in as {}", user.name);
    Ok(())
}

async fn handle_reset(state: &AppState) -> Result<()> {
    let deleted = state.store.reset_users().await?;
    println!("Reset complete, {} users deleted", deleted);
    Ok(())
}

async fn handle_users(state: &AppState) -> Result<()> {
    let current = state.config.current_user();

    for user in state.store.list_users().await? {
        if Some(user.name.as_str()) == current {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

fn validate_feed_url(raw: &str) -> Result<()> {
    let parsed = Url::parse(raw)
        .map_err(|e| AggregatorError::Usage(format!("invalid feed URL {}: {}", raw, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
        return Err(AggregatorError::Usage(format!(
            "feed URL must be http(s) with a host: {}",
            raw
        )));
    }
    Ok(())
}

async fn handle_add_feed(state: &AppState, user: &User, name: &str, url: &str) -> Result<()> {
    validate_feed_url(url)?;

    let feed = match state.store.create_feed(name, url, user.id).await {
        Ok(feed) => feed,
        Err(StoreError::DuplicateKey { .. }) => {
            return Err(AggregatorError::Usage(format!("feed {} already exists", url)))
        }
        Err(e) => return Err(e.into()),
    };
    state.store.create_feed_follow(user.id, feed.id).await?;

    println!("Feed added:");
    println!("  ID:   {}", feed.id);
    println!("  Name: {}", feed.name);
    println!("  URL:  {}", feed.url);
    println!("{} now follows {}", user.name, feed.name);
    Ok(())
}

async fn handle_feeds(state: &AppState) -> Result<()> {
    for feed in state.store.list_feeds().await? {
        println!("* {} ({}) by {}", feed.name, feed.url, feed.user_name);
    }
    Ok(())
}

async fn handle_follow(state: &AppState, user: &User, url: &str) -> Result<()> {
    let feed = match state.store.get_feed_by_url(url).await {
        Ok(feed) => feed,
        Err(StoreError::NotFound) => {
            return Err(AggregatorError::Usage(format!("no feed with URL {}", url)))
        }
        Err(e) => return Err(e.into()),
    };

    match state.store.create_feed_follow(user.id, feed.id).await {
        Ok(_) => {}
        Err(StoreError::DuplicateKey { .. }) => {
            return Err(AggregatorError::Usage(format!(
                "{} already follows {}",
                user.name, feed.name
            )))
        }
        Err(e) => return Err(e.into()),
    }

    println!("{} now follows {}", user.name, feed.name);
    Ok(())
}

async fn handle_following(state: &AppState, user: &User) -> Result<()> {
    for follow in state.store.feed_follows_for_user(user.id).await? {
        println!("* {} ({})", follow.feed_name, follow.feed_url);
    }
    Ok(())
}

async fn handle_unfollow(state: &AppState, user: &User, url: &str) -> Result<()> {
    let feed = match state.store.get_feed_by_url(url).await {
        Ok(feed) => feed,
        Err(StoreError::NotFound) => {
            return Err(AggregatorError::Usage(format!("no feed with URL {}", url)))
        }
        Err(e) => return Err(e.into()),
    };

    match state.store.delete_feed_follow(user.id, feed.id).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => {
            return Err(AggregatorError::Usage(format!(
                "{} does not follow {}",
                user.name, feed.name
            )))
        }
        Err(e) => return Err(e.into()),
    }

    println!("{} unfollowed {}", user.name, feed.name);
    Ok(())
}

async fn handle_agg(state: &AppState, time_between_reqs: &str) -> Result<()> {
    let interval = parse_duration(time_between_reqs)?;
    let fetcher = Fetcher::new(FetchConfig::default())?;
    let scheduler = Scheduler::new(Arc::new(state.store.clone()), fetcher, interval)?;

    println!("Collecting feeds every {:?}", interval);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = scheduler.run_scheduler(shutdown_rx);
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => return Ok(()),
        signal = signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("Received Ctrl-C, stopping after the current tick");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!("Cannot listen for Ctrl-C ({}), running until terminated", e),
        },
    }

    run.await;
    Ok(())
}

async fn handle_browse(state: &AppState, user: &User, limit: i64) -> Result<()> {
    if limit <= 0 {
        return Err(AggregatorError::Usage("limit must be a positive number".to_string()));
    }

    let posts = state.store.posts_for_user(user.id, limit).await?;
    if posts.is_empty() {
        println!("No posts yet. Follow some feeds and run `gator agg`.");
        return Ok(());
    }

    for post in posts {
        println!("Title: {}", post.title);
        println!("URL: {}", post.url);
        if let Some(published_at) = post.published_at {
            println!("Published: {}", published_at.format("%Y-%m-%d %H:%M UTC"));
        }
        if let Some(description) = &post.description {
            println!("{}", description);
        }
        println!("----");
    }
    Ok(())
}
