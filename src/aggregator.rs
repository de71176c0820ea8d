//! Fetch orchestration and the published snapshot.
//!
//! [`Aggregator::refresh`] fans out one task per fetcher, waits for all of
//! them, then dedupes, tags and sorts the merged items before swapping them
//! in as the new snapshot. Queries read whichever snapshot is current.
//!
//! Overlapping refreshes are not serialised; the one that finishes last
//! publishes last.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::Cache;
use crate::error::{AggregatorError, FetchError};
use crate::fetcher::Fetcher;
use crate::model::{AggregatedResponse, FeedItem, FetchResult, FilterParams, SortOrder, SourceInfo};
use crate::tagger::Tagger;

/// Cache key under which the last published item list is mirrored.
pub const ITEMS_CACHE_KEY: &str = "aggregator:items";

pub type ItemCache = Cache<String, Arc<Vec<FeedItem>>>;

#[derive(Default)]
struct Snapshot {
    items: Arc<Vec<FeedItem>>,
    fetched_at: Option<DateTime<Utc>>,
}

/// Summary of one completed refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub sources: usize,
    /// Names of sources whose fetch failed, in registration order.
    pub failed: Vec<String>,
    pub items: usize,
    pub finished_at: DateTime<Utc>,
}

pub struct Aggregator {
    fetchers: Vec<Arc<dyn Fetcher>>,
    tagger: RwLock<Tagger>,
    cache: Arc<ItemCache>,
    snapshot: RwLock<Snapshot>,
    last_refresh: RwLock<Option<RefreshReport>>,
}

impl Aggregator {
    pub fn new(fetchers: Vec<Arc<dyn Fetcher>>, tagger: Tagger, cache: Arc<ItemCache>) -> Self {
        Self {
            fetchers,
            tagger: RwLock::new(tagger),
            cache,
            snapshot: RwLock::new(Snapshot::default()),
            last_refresh: RwLock::new(None),
        }
    }

    /// Tag rules; changes apply from the next refresh.
    pub fn tagger(&self) -> &RwLock<Tagger> {
        &self.tagger
    }

    pub fn cache(&self) -> &Arc<ItemCache> {
        &self.cache
    }

    pub async fn last_refresh(&self) -> Option<RefreshReport> {
        self.last_refresh.read().await.clone()
    }

    /// Fetch every source, merge, and publish a new snapshot.
    ///
    /// Failed sources are logged and left out. Cancellation before or during
    /// the fetch leaves the current snapshot in place.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<RefreshReport, AggregatorError> {
        if cancel.is_cancelled() {
            return Err(AggregatorError::Cancelled);
        }

        let started = Instant::now();
        let results = self.fetch_all(cancel).await;
        if cancel.is_cancelled() {
            warn!("Refresh cancelled, keeping previous snapshot");
            return Err(AggregatorError::Cancelled);
        }

        let mut failed = Vec::new();
        let mut merged = Vec::new();
        for result in results {
            match result.outcome {
                Ok(items) => merged.extend(items),
                Err(e) => {
                    warn!(source = %result.source.name, error = %e, "source fetch failed");
                    failed.push(result.source.name);
                }
            }
        }

        let mut items = dedupe(merged);
        {
            let tagger = self.tagger.read().await;
            for item in &mut items {
                let inferred = tagger.infer_tags(&item.title, &item.summary);
                item.merge_tags(inferred);
            }
        }
        sort_newest_first(&mut items);

        let report = RefreshReport {
            sources: self.fetchers.len(),
            failed,
            items: items.len(),
            finished_at: Utc::now(),
        };
        self.publish(items, report.finished_at).await;
        *self.last_refresh.write().await = Some(report.clone());

        info!(
            sources = report.sources,
            failed = report.failed.len(),
            items = report.items,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh complete"
        );
        Ok(report)
    }

    /// Run every fetcher concurrently and collect the results in
    /// registration order.
    async fn fetch_all(&self, cancel: &CancellationToken) -> Vec<FetchResult> {
        let (tx, mut rx) = mpsc::channel(self.fetchers.len().max(1));
        let mut workers = JoinSet::new();

        for (index, fetcher) in self.fetchers.iter().enumerate() {
            let fetcher = fetcher.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            workers.spawn(async move {
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::Cancelled),
                    result = fetcher.fetch(&cancel) => result,
                };
                // Capacity matches the worker count, so this never waits.
                let _ = tx
                    .send(FetchResult {
                        index,
                        source: fetcher.source_info(),
                        outcome,
                    })
                    .await;
            });
        }
        drop(tx);

        // The channel closes once every worker has dropped its sender.
        let mut results = Vec::with_capacity(self.fetchers.len());
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Fetch worker failed: {}", e);
            }
        }

        results.sort_by_key(|r| r.index);
        results
    }

    async fn publish(&self, items: Vec<FeedItem>, fetched_at: DateTime<Utc>) {
        let items = Arc::new(items);
        {
            let mut snapshot = self.snapshot.write().await;
            *snapshot = Snapshot {
                items: items.clone(),
                fetched_at: Some(fetched_at),
            };
        }
        self.cache.set(ITEMS_CACHE_KEY.to_string(), items).await;
    }

    /// Filter and paginate the current snapshot.
    pub async fn get_items(&self, params: &FilterParams) -> AggregatedResponse {
        let (items, fetched_at) = {
            let snapshot = self.snapshot.read().await;
            (snapshot.items.clone(), snapshot.fetched_at)
        };

        let source = normalize_filter(params.source.as_deref());
        let tag = normalize_filter(params.tag.as_deref());
        let search = normalize_filter(params.search.as_deref());

        let mut filtered: Vec<&FeedItem> = items
            .iter()
            .filter(|item| source.as_ref().map_or(true, |s| item.source.to_lowercase() == *s))
            .filter(|item| tag.as_ref().map_or(true, |t| item.has_tag(t)))
            .filter(|item| {
                search.as_ref().map_or(true, |q| {
                    item.title.to_lowercase().contains(q.as_str())
                        || item.summary.to_lowercase().contains(q.as_str())
                })
            })
            .collect();

        if params.sort == SortOrder::Oldest {
            filtered.sort_by_key(|item| item.published_at);
        }

        let total_count = filtered.len();
        let page = filtered[page_bounds(total_count, params.limit, params.offset)]
            .iter()
            .map(|item| (*item).clone())
            .collect();

        AggregatedResponse {
            items: page,
            total_count,
            fetched_at,
            source_count: self.fetchers.len(),
        }
    }

    pub fn get_sources(&self) -> Vec<SourceInfo> {
        self.fetchers.iter().map(|f| f.source_info()).collect()
    }
}

fn normalize_filter(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Drop repeated ids, then repeated normalised titles. First occurrence wins.
pub fn dedupe(items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen_ids = HashSet::new();
    let mut items: Vec<FeedItem> = items
        .into_iter()
        .filter(|item| seen_ids.insert(item.id.clone()))
        .collect();

    let mut seen_titles = HashSet::new();
    items.retain(|item| seen_titles.insert(item.normalized_title()));
    items
}

/// Stable sort, newest first.
pub fn sort_newest_first(items: &mut [FeedItem]) {
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

/// Index range of the requested page within `len` items.
///
/// A non-positive limit selects every item and ignores `offset`. A negative
/// offset counts as zero; one past the end selects nothing.
fn page_bounds(len: usize, limit: i64, offset: i64) -> Range<usize> {
    if limit <= 0 {
        return 0..len;
    }
    let start = usize::try_from(offset).unwrap_or(0).min(len);
    let end = start
        .saturating_add(usize::try_from(limit).unwrap_or(usize::MAX))
        .min(len);
    start..end
}

/// Refresh once immediately, then every `interval` until `shutdown` fires.
pub async fn start_background_refresh(
    aggregator: Arc<Aggregator>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!("Starting initial refresh");
    if let Err(e) = aggregator.refresh(&shutdown).await {
        error!("Initial refresh failed: {}", e);
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Background refresh stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        info!("Starting scheduled refresh");
        if let Err(e) = aggregator.refresh(&shutdown).await {
            error!("Scheduled refresh failed: {}", e);
        }
    }
}
