//! Source fetchers.
//!
//! Every source kind implements [`Fetcher`]. Requests go through a shared
//! [`SourceClient`], which waits on the per-host [`RateLimiter`] before each
//! round trip and abandons the request when the refresh is cancelled.

mod reddit;
mod rss;
mod youtube;

pub use reddit::RedditFetcher;
pub use rss::RssFetcher;
pub use youtube::YouTubeFetcher;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::model::{FeedItem, SourceInfo, SourceKind};
use crate::rate_limiter::{host_of, RateLimiter};

/// Retrieves normalised items from one external source.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &str;

    fn source_info(&self) -> SourceInfo;

    /// Fetch the current items. Malformed entries are skipped; only a
    /// failure of the whole source is returned as an error.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<FeedItem>, FetchError>;
}

/// HTTP client shared by all fetchers.
#[derive(Clone)]
pub struct SourceClient {
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl SourceClient {
    pub fn new(limiter: Arc<RateLimiter>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("FeedAggregator/1.0 (Content Aggregator)")
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self { client, limiter })
    }

    /// GET `url` and return the body of a successful response.
    pub async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, FetchError> {
        let host = host_of(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        let request = async {
            self.limiter.wait(&host).await;
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            Ok(response.bytes().await?.to_vec())
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = request => result,
        }
    }
}

/// Construct one fetcher per enabled source, in configuration order.
pub fn build_fetchers(
    sources: &[SourceConfig],
    client: &SourceClient,
) -> anyhow::Result<Vec<Arc<dyn Fetcher>>> {
    let mut fetchers: Vec<Arc<dyn Fetcher>> = Vec::new();

    for source in sources.iter().filter(|s| s.enabled) {
        let url = source.resolved_url()?;
        let mut info = SourceInfo::new(&source.name, source.kind, &url);
        info.category = source.category.clone();

        let fetcher: Arc<dyn Fetcher> = match source.kind {
            SourceKind::Rss => Arc::new(RssFetcher::new(info, client.clone())),
            SourceKind::Youtube => {
                info.channel_id = source.channel_id.clone();
                Arc::new(YouTubeFetcher::new(info, client.clone()))
            }
            SourceKind::Reddit => {
                info.subreddit = source.subreddit.clone();
                Arc::new(RedditFetcher::new(info, client.clone()))
            }
        };
        fetchers.push(fetcher);
    }

    info!("Built {} fetchers", fetchers.len());
    Ok(fetchers)
}
