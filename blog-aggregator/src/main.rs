use anyhow::Context;
use blog_aggregator::cli::{self, AppState, Cli};
use blog_aggregator::config::Config;
use blog_aggregator::store::PgStore;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = Config::read().context("failed to read config")?;
    let database_url = config.database_url();
    debug!("Connecting to database");

    let store = PgStore::new(&database_url)
        .await
        .context("failed to connect to database")?;
    store.migrate().await.context("failed to run migrations")?;

    let mut state = AppState { store, config };

    if let Err(e) = cli::run(&mut state, cli.command).await {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}
