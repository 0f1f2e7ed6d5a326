use crate::parser::parse_feed_document;
use crate::types::{AggregatorError, FeedItem, FetchConfig, Result};
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Retrieves feed documents over HTTP. Never retries; a failed fetch is
/// reported once and the caller decides what to do next.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetches `url` and parses it into feed items. The whole exchange,
    /// body included, must finish within `deadline`.
    pub async fn fetch_feed(&self, url: &str, deadline: Duration) -> Result<Vec<FeedItem>> {
        let start_time = Instant::now();
        debug!("Fetching feed: {} (deadline {:?})", url, deadline);

        let response = self
            .client
            .get(url)
            .header(ACCEPT, &self.config.accept)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| fetch_failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_failed(
                url,
                format!("HTTP {}: {}", status, status.canonical_reason().unwrap_or("Unknown")),
            ));
        }

        let max_bytes = self.config.max_feed_size_mb * 1024 * 1024;
        if let Some(content_length) = response.content_length() {
            if content_length as usize > max_bytes {
                return Err(fetch_failed(url, format!("feed too large: {} bytes", content_length)));
            }
        }

        let body = response.bytes().await.map_err(|e| fetch_failed(url, e))?;
        if body.len() > max_bytes {
            return Err(fetch_failed(url, format!("feed too large: {} bytes", body.len())));
        }

        let items = parse_feed_document(&body).map_err(|reason| fetch_failed(url, reason))?;

        info!(
            "Fetched feed {} ({} bytes, {} items) in {}ms",
            url,
            body.len(),
            items.len(),
            start_time.elapsed().as_millis()
        );
        Ok(items)
    }
}

fn fetch_failed(url: &str, reason: impl ToString) -> AggregatorError {
    AggregatorError::FetchFailed {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
