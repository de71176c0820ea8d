use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Fetcher, SourceClient};
use crate::error::FetchError;
use crate::model::{FeedItem, SourceInfo};

/// RSS 2.0 / Atom feed.
pub struct RssFetcher {
    info: SourceInfo,
    client: SourceClient,
}

impl RssFetcher {
    pub fn new(info: SourceInfo, client: SourceClient) -> Self {
        Self { info, client }
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<FeedItem>, FetchError> {
        info!("Fetching feed: {} ({})", self.info.name, self.info.url);

        let bytes = self.client.get(&self.info.url, cancel).await?;
        let items = parse_feed(&self.info, &bytes)?;

        info!("Parsed {} items for feed '{}'", items.len(), self.info.name);
        Ok(items)
    }
}

/// Parse an RSS/Atom document into items, skipping malformed entries.
pub(crate) fn parse_feed(source: &SourceInfo, bytes: &[u8]) -> Result<Vec<FeedItem>, FetchError> {
    let parsed = parser::parse(bytes)?;
    Ok(parsed
        .entries
        .into_iter()
        .filter_map(|entry| entry_to_item(source, entry))
        .collect())
}

/// Convert one feed entry. Entries without a title, link or date are skipped.
pub(crate) fn entry_to_item(source: &SourceInfo, entry: Entry) -> Option<FeedItem> {
    let title = match entry.title.as_ref().map(|t| t.content.trim()) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            debug!(source = %source.name, entry = %entry.id, "skipping entry with no title");
            return None;
        }
    };

    let Some(url) = entry.links.first().map(|l| l.href.clone()) else {
        debug!(source = %source.name, title = %title, "skipping entry with no link");
        return None;
    };

    let published_at: Option<DateTime<Utc>> = entry.published.or(entry.updated);
    let Some(published_at) = published_at else {
        debug!(source = %source.name, title = %title, "skipping entry with no date");
        return None;
    };

    let native_id = if entry.id.is_empty() { url.clone() } else { entry.id.clone() };

    let summary = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
        .or_else(|| {
            entry
                .media
                .iter()
                .find_map(|m| m.description.as_ref().map(|d| d.content.clone()))
        })
        .unwrap_or_default();

    let mut item = FeedItem {
        id: format!("{}:{}", source.id, native_id),
        source: source.name.clone(),
        title,
        summary: summary.trim().to_string(),
        url,
        published_at,
        tags: Vec::new(),
    };
    item.merge_tags(
        entry
            .categories
            .iter()
            .map(|c| c.label.clone().unwrap_or_else(|| c.term.clone()))
            .filter(|t| !t.trim().is_empty()),
    );
    Some(item)
}
