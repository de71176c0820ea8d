use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Fetcher, SourceClient};
use crate::error::FetchError;
use crate::model::{FeedItem, SourceInfo};

const REDDIT_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    // Decoded one by one so a bad post does not sink the listing.
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    permalink: String,
    created_utc: f64,
    #[serde(default)]
    link_flair_text: Option<String>,
}

/// Posts from one subreddit's JSON listing.
pub struct RedditFetcher {
    info: SourceInfo,
    client: SourceClient,
}

impl RedditFetcher {
    pub fn new(info: SourceInfo, client: SourceClient) -> Self {
        Self { info, client }
    }
}

#[async_trait]
impl Fetcher for RedditFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<FeedItem>, FetchError> {
        info!("Fetching listing: {} ({})", self.info.name, self.info.url);

        let bytes = self.client.get(&self.info.url, cancel).await?;
        let items = parse_listing(&self.info, &bytes)?;

        info!("Parsed {} posts for '{}'", items.len(), self.info.name);
        Ok(items)
    }
}

fn parse_listing(source: &SourceInfo, bytes: &[u8]) -> Result<Vec<FeedItem>, FetchError> {
    let listing: Listing = serde_json::from_slice(bytes)?;

    Ok(listing
        .data
        .children
        .into_iter()
        .filter_map(|child| match serde_json::from_value::<Child>(child) {
            Ok(child) => post_to_item(source, child.data),
            Err(e) => {
                debug!(source = %source.name, error = %e, "skipping malformed post");
                None
            }
        })
        .collect())
}

fn post_to_item(source: &SourceInfo, post: Post) -> Option<FeedItem> {
    let title = post.title.trim();
    if title.is_empty() {
        debug!(source = %source.name, post = %post.id, "skipping post with no title");
        return None;
    }

    let Some(published_at) = DateTime::from_timestamp(post.created_utc as i64, 0) else {
        debug!(source = %source.name, post = %post.id, "skipping post with bad timestamp");
        return None;
    };

    let mut item = FeedItem {
        id: format!("{}:{}", source.id, post.id),
        source: source.name.clone(),
        title: title.to_string(),
        summary: post.selftext.trim().to_string(),
        url: format!("{}{}", REDDIT_BASE, post.permalink),
        published_at,
        tags: Vec::new(),
    };
    if let Some(flair) = post.link_flair_text.filter(|f| !f.trim().is_empty()) {
        item.merge_tags([flair.trim().to_string()]);
    }
    Some(item)
}
