pub mod cli;
pub mod config;
pub mod dates;
pub mod fetcher;
pub mod ingest;
pub mod parser;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod utils;

pub use types::*;
pub use config::Config;
pub use dates::parse_published_at;
pub use fetcher::Fetcher;
pub use ingest::{ingest_items, IngestReport};
pub use scheduler::{Scheduler, TickOutcome};
pub use store::{FeedStore, MemoryStore, PgStore};
