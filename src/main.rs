use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_aggregator::aggregator::{start_background_refresh, Aggregator};
use feed_aggregator::cache::Cache;
use feed_aggregator::config::Config;
use feed_aggregator::fetcher::{build_fetchers, SourceClient};
use feed_aggregator::rate_limiter::RateLimiter;
use feed_aggregator::tagger::Tagger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_aggregator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("SOURCES_CONFIG").unwrap_or_else(|_| "sources.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "Loaded {} sources from {} ({} enabled)",
        config.sources.len(),
        config_path,
        config.enabled_sources().count()
    );

    let limiter = Arc::new(RateLimiter::new(config.rate_limit()));
    let client = SourceClient::new(limiter, config.fetch_timeout())?;
    let fetchers = build_fetchers(&config.sources, &client)?;

    let cache = Arc::new(Cache::new(config.cache_ttl(), config.cache_sweep()));
    let aggregator = Arc::new(Aggregator::new(
        fetchers,
        Tagger::with_default_rules(),
        cache.clone(),
    ));

    let shutdown = CancellationToken::new();
    let refresher = tokio::spawn(start_background_refresh(
        aggregator.clone(),
        config.refresh_every(),
        shutdown.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown.cancel();
    refresher.await?;
    cache.stop();

    if let Some(report) = aggregator.last_refresh().await {
        info!(
            "Last refresh: {} items from {} sources ({} failed)",
            report.items,
            report.sources,
            report.failed.len()
        );
    }

    Ok(())
}
