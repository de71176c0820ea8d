use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A single aggregated content entry, normalised across source kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Source-qualified identifier, `<source-id>:<native id>`.
    pub id: String,
    /// Name of the fetcher that produced this item.
    pub source: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FeedItem {
    /// Union `inferred` into the item's tags.
    ///
    /// Existing tags keep their position; new tags are appended in the order
    /// given, skipping any that already exist ignoring case.
    pub fn merge_tags<I, S>(&mut self, inferred: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen: HashSet<String> = self.tags.iter().map(|t| t.to_lowercase()).collect();
        for tag in inferred {
            let tag = tag.into();
            if seen.insert(tag.to_lowercase()) {
                self.tags.push(tag);
            }
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == wanted)
    }

    /// Lowercased, trimmed title used for duplicate detection.
    pub fn normalized_title(&self) -> String {
        self.title.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Youtube,
    Reddit,
}

impl SourceKind {
    /// Shape of the payload the source serves.
    pub fn feed_type(&self) -> &'static str {
        match self {
            SourceKind::Rss | SourceKind::Youtube => "xml",
            SourceKind::Reddit => "json",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::Rss => "rss",
            SourceKind::Youtube => "youtube",
            SourceKind::Reddit => "reddit",
        };
        f.write_str(s)
    }
}

/// Static descriptor of one registered fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub source_type: SourceKind,
    pub feed_type: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
}

impl SourceInfo {
    pub fn new(name: &str, kind: SourceKind, url: &str) -> Self {
        Self {
            id: slugify(name),
            name: name.to_string(),
            source_type: kind,
            feed_type: kind.feed_type().to_string(),
            url: url.to_string(),
            category: None,
            channel_id: None,
            subreddit: None,
        }
    }
}

/// Outcome of one fetch invocation, consumed by the aggregator's collector.
#[derive(Debug)]
pub struct FetchResult {
    /// Registration index of the fetcher; merge order follows it.
    pub index: usize,
    pub source: SourceInfo,
    pub outcome: Result<Vec<FeedItem>, FetchError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

/// Query over the published snapshot. Every filter is optional and
/// case-insensitive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterParams {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    /// Non-positive means no windowing.
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub sort: SortOrder,
}

impl FilterParams {
    /// Filter on an exact (case-insensitive) source name.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResponse {
    pub items: Vec<FeedItem>,
    /// Number of items matching the filters before pagination.
    pub total_count: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub source_count: usize,
}

/// Lowercase ASCII slug: alphanumeric runs kept, everything else collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_item(tags: &[&str]) -> FeedItem {
        FeedItem {
            id: "blog:1".to_string(),
            source: "Blog".to_string(),
            title: "  Quad Review ".to_string(),
            summary: String::new(),
            url: "https://blog.example.com/1".to_string(),
            published_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    mod merge_tags_tests {
        use super::*;

        #[test]
        fn test_existing_tags_keep_order() {
            let mut item = make_item(&["Zeta", "Alpha"]);
            item.merge_tags(["Beta"]);
            assert_eq!(item.tags, vec!["Zeta", "Alpha", "Beta"]);
        }

        #[test]
        fn test_case_insensitive_duplicates_skipped() {
            let mut item = make_item(&["review"]);
            item.merge_tags(["Review", "DJI"]);
            assert_eq!(item.tags, vec!["review", "DJI"]);
        }

        #[test]
        fn test_duplicates_within_inferred_set() {
            let mut item = make_item(&[]);
            item.merge_tags(["FPV", "fpv"]);
            assert_eq!(item.tags, vec!["FPV"]);
        }

        #[test]
        fn test_has_tag_ignores_case() {
            let item = make_item(&["Review"]);
            assert!(item.has_tag("REVIEW"));
            assert!(!item.has_tag("News"));
        }
    }

    #[test]
    fn test_normalized_title() {
        assert_eq!(make_item(&[]).normalized_title(), "quad review");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hacker News"), "hacker-news");
        assert_eq!(slugify("  r/FPV -- Daily! "), "r-fpv-daily");
        assert_eq!(slugify("DroneDJ"), "dronedj");
    }

    #[test]
    fn test_source_info_new() {
        let info = SourceInfo::new("Drone DJ", SourceKind::Rss, "https://dronedj.com/feed/");
        assert_eq!(info.id, "drone-dj");
        assert_eq!(info.feed_type, "xml");
        assert_eq!(info.source_type.to_string(), "rss");
    }

    #[test]
    fn test_filter_params_builder() {
        let params = FilterParams::default()
            .source("Blog")
            .tag("FPV")
            .page(10, 5)
            .sort(SortOrder::Oldest);
        assert_eq!(params.source.as_deref(), Some("Blog"));
        assert_eq!(params.tag.as_deref(), Some("FPV"));
        assert!(params.search.is_none());
        assert_eq!((params.limit, params.offset), (10, 5));
        assert_eq!(params.sort, SortOrder::Oldest);
    }
}
