use std::sync::Arc;
use std::time::Duration;

mod ai;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod report;
mod search;
mod server;
mod text;

use ai::AiClient;
use config::Config;
use db::Repository;
use error::Result;
use feed::FeedFetcher;
use search::SimilarityIndex;
use server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::load()?;
    let repo = Repository::new(&config.db_path).await?;

    let fetcher = Arc::new(FeedFetcher::new());
    let ai = Arc::new(AiClient::new(&config));
    let backend = config.search_backend.parse()?;
    let search = Arc::new(SimilarityIndex::new(backend, ai.clone()));

    let state = AppState {
        repo,
        fetcher,
        ai,
        search,
    };

    // Periodic all-feeds refresh, independent of the HTTP surface. The
    // interval setting is re-read on every cycle so changes apply without a
    // restart.
    let scheduler = state.clone();
    tokio::spawn(async move {
        loop {
            let minutes = scheduler.repo.refresh_interval_minutes().await;
            tokio::time::sleep(Duration::from_secs(u64::from(minutes) * 60)).await;
            tracing::info!("Scheduled feed refresh starting");
            scheduler.fetcher.fetch_all(&scheduler.repo).await;
        }
    });

    server::serve(state, &config.bind_addr).await
}
