//! Round-robin feed polling.
//!
//! Each tick claims the least recently fetched feed, fetches it and ingests
//! its items. Exactly one feed is in flight at a time.

use crate::fetcher::Fetcher;
use crate::ingest::{ingest_items, IngestReport};
use crate::store::FeedStore;
use crate::types::{AggregatorError, Result, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No feeds to poll.
    Idle,
    /// The store could not pick or mark a feed.
    ClaimFailed,
    /// The claimed feed could not be fetched or parsed.
    FetchFailed { feed_id: Uuid },
    Ingested { feed_id: Uuid, report: IngestReport },
}

pub struct Scheduler<S: ?Sized> {
    store: Arc<S>,
    fetcher: Fetcher,
    interval: Duration,
}

impl<S> Scheduler<S>
where
    S: FeedStore + ?Sized,
{
    pub fn new(store: Arc<S>, fetcher: Fetcher, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(AggregatorError::InvalidInterval(
                "interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            store,
            fetcher,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadline for one fetch or storage call: the configured request
    /// timeout, capped below the tick interval.
    pub fn fetch_deadline(&self) -> Duration {
        let cap = self.interval * 9 / 10;
        self.fetcher.config().timeout.min(cap)
    }

    /// Runs one tick. Failures are logged and reported in the outcome, never
    /// returned as errors.
    pub async fn run_scrape_tick(&self) -> TickOutcome {
        let deadline = self.fetch_deadline();

        let feed = match timeout(deadline, self.store.claim_next_feed()).await {
            Ok(Ok(feed)) => feed,
            Ok(Err(StoreError::NotFound)) => {
                debug!("No feeds to fetch");
                return TickOutcome::Idle;
            }
            Ok(Err(e)) => {
                error!("Failed to claim next feed: {}", e);
                return TickOutcome::ClaimFailed;
            }
            Err(_) => {
                error!("Claiming next feed timed out after {:?}", deadline);
                return TickOutcome::ClaimFailed;
            }
        };

        info!("Fetching feed {} ({})", feed.name, feed.url);

        let items = match self.fetcher.fetch_feed(&feed.url, deadline).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Skipping feed {} this tick: {}", feed.id, e);
                return TickOutcome::FetchFailed { feed_id: feed.id };
            }
        };

        let report = ingest_items(self.store.as_ref(), feed.id, &items, deadline).await;
        TickOutcome::Ingested {
            feed_id: feed.id,
            report,
        }
    }

    /// Ticks immediately and then once per interval until `shutdown` turns
    /// true or its sender is dropped. Shutdown is only observed between
    /// ticks; a running tick always finishes.
    pub async fn run_scheduler(&self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow() {
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Collecting feeds every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_scrape_tick().await;
                }
            }
        }

        info!("Feed collection stopped");
    }
}
