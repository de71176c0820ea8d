use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::rss::parse_feed;
use super::{Fetcher, SourceClient};
use crate::error::FetchError;
use crate::model::{FeedItem, SourceInfo};

const VIDEO_TAG: &str = "Video";

/// Uploads of one YouTube channel, read from its public Atom feed.
///
/// The video description lives in `media:group`, which is where the summary
/// comes from for these entries.
pub struct YouTubeFetcher {
    info: SourceInfo,
    client: SourceClient,
}

impl YouTubeFetcher {
    pub fn new(info: SourceInfo, client: SourceClient) -> Self {
        Self { info, client }
    }
}

#[async_trait]
impl Fetcher for YouTubeFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<FeedItem>, FetchError> {
        info!("Fetching channel: {} ({})", self.info.name, self.info.url);

        let bytes = self.client.get(&self.info.url, cancel).await?;
        let mut items = parse_feed(&self.info, &bytes)?;
        for item in &mut items {
            item.merge_tags([VIDEO_TAG]);
        }

        info!("Parsed {} videos for channel '{}'", items.len(), self.info.name);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use crate::rate_limiter::RateLimiter;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHANNEL_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <feed xmlns:yt="http://www.youtube.com/xml/schemas/2015"
              xmlns:media="http://search.yahoo.com/mrss/"
              xmlns="http://www.w3.org/2005/Atom">
            <id>yt:channel:UC123</id>
            <title>FPV Channel</title>
            <entry>
                <id>yt:video:abc123</id>
                <yt:videoId>abc123</yt:videoId>
                <title>Avata 2 hands-on</title>
                <link rel="alternate" href="https://www.youtube.com/watch?v=abc123"/>
                <published>2025-03-01T15:00:00+00:00</published>
                <updated>2025-03-02T10:00:00+00:00</updated>
                <media:group>
                    <media:title>Avata 2 hands-on</media:title>
                    <media:description>First flights with the new goggles.</media:description>
                </media:group>
            </entry>
        </feed>
    "#;

    #[tokio::test]
    async fn test_fetch_channel_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feeds/videos.xml"))
            .and(query_param("channel_id", "UC123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CHANNEL_FEED))
            .mount(&server)
            .await;

        let mut info = SourceInfo::new(
            "FPV Channel",
            SourceKind::Youtube,
            &format!("{}/feeds/videos.xml?channel_id=UC123", server.uri()),
        );
        info.channel_id = Some("UC123".to_string());

        let client =
            SourceClient::new(Arc::new(RateLimiter::new(Duration::ZERO)), Duration::from_secs(5))
                .unwrap();
        let fetcher = YouTubeFetcher::new(info, client);

        let items = fetcher.fetch(&CancellationToken::new()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "fpv-channel:yt:video:abc123");
        assert_eq!(items[0].url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(items[0].summary, "First flights with the new goggles.");
        assert_eq!(items[0].tags, vec!["Video"]);
        assert_eq!(fetcher.source_info().channel_id.as_deref(), Some("UC123"));
    }
}
