use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use anyhow::bail;

use crate::model::SourceKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Minimum delay between requests to one host, in milliseconds
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_sweep_secs")]
    pub cache_sweep_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    pub sources: Vec<SourceConfig>,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_rate_limit_ms() -> u64 {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    1800
}

fn default_cache_sweep_secs() -> u64 {
    60
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// YouTube channel identifier
    #[serde(default)]
    pub channel_id: Option<String>,
    /// Subreddit name without the `r/` prefix
    #[serde(default)]
    pub subreddit: Option<String>,
}

impl SourceConfig {
    /// URL to fetch, derived from the kind-specific field when `url` is unset.
    pub fn resolved_url(&self) -> anyhow::Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        match self.kind {
            SourceKind::Rss => bail!("source '{}' has no url", self.name),
            SourceKind::Youtube => match &self.channel_id {
                Some(id) => Ok(format!(
                    "https://www.youtube.com/feeds/videos.xml?channel_id={}",
                    id
                )),
                None => bail!("youtube source '{}' needs a url or channel_id", self.name),
            },
            SourceKind::Reddit => match &self.subreddit {
                Some(sub) => Ok(format!("https://www.reddit.com/r/{}/.json", sub)),
                None => bail!("reddit source '{}' needs a url or subreddit", self.name),
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval == 0 {
            bail!("refresh_interval must be at least 1 minute");
        }
        if self.cache_sweep_secs == 0 {
            bail!("cache_sweep_secs must be at least 1 second");
        }
        Ok(())
    }

    pub fn refresh_every(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.saturating_mul(60))
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::from_str("sources = []").unwrap();
        assert_eq!(config.refresh_interval, 15);
        assert_eq!(config.rate_limit(), Duration::from_secs(1));
        assert_eq!(config.cache_ttl(), Duration::from_secs(1800));
        assert_eq!(config.cache_sweep(), Duration::from_secs(60));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.refresh_every(), Duration::from_secs(900));
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            refresh_interval = 30
            rate_limit_ms = 250

            [[sources]]
            name = "DroneDJ"
            kind = "rss"
            url = "https://dronedj.com/feed/"
            category = "news"

            [[sources]]
            name = "Joshua Bardwell"
            kind = "youtube"
            channel_id = "UCX3eufnI7A2I7IkKHZn8KSQ"

            [[sources]]
            name = "r/fpv"
            kind = "reddit"
            subreddit = "fpv"
            enabled = false
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.refresh_interval, 30);
        assert_eq!(config.rate_limit(), Duration::from_millis(250));
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[0].kind, SourceKind::Rss);
        assert_eq!(config.sources[0].category.as_deref(), Some("news"));
        assert!(config.sources[0].enabled);
        assert_eq!(config.sources[1].kind, SourceKind::Youtube);
        assert!(!config.sources[2].enabled);
        assert_eq!(config.enabled_sources().count(), 2);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/sources.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let content = r#"
            [[sources]]
            name = "Mastodon"
            kind = "activitypub"
            url = "https://example.social"
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let err = Config::from_str("refresh_interval = 0\nsources = []").unwrap_err();
        assert!(err.to_string().contains("refresh_interval"));

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"refresh_interval = 0\nsources = []").unwrap();
        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_zero_cache_sweep_rejected() {
        let err = Config::from_str("cache_sweep_secs = 0\nsources = []").unwrap_err();
        assert!(err.to_string().contains("cache_sweep_secs"));
    }

    #[test]
    fn test_huge_refresh_interval_saturates() {
        // TOML integers top out at i64::MAX, which still overflows `* 60`.
        let content = format!("refresh_interval = {}\nsources = []", i64::MAX);
        let config = Config::from_str(&content).unwrap();
        assert_eq!(config.refresh_every(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_missing_sources_rejected() {
        assert!(Config::from_str("refresh_interval = 5").is_err());
    }

    mod resolved_url_tests {
        use super::*;

        fn source(kind: &str, extra: &str) -> SourceConfig {
            let content = format!(
                "[[sources]]\nname = \"S\"\nkind = \"{}\"\n{}\n",
                kind, extra
            );
            Config::from_str(&content).unwrap().sources.remove(0)
        }

        #[test]
        fn test_explicit_url_wins() {
            let s = source("youtube", "url = \"http://localhost/yt\"\nchannel_id = \"abc\"");
            assert_eq!(s.resolved_url().unwrap(), "http://localhost/yt");
        }

        #[test]
        fn test_youtube_channel_url() {
            let s = source("youtube", "channel_id = \"abc\"");
            assert_eq!(
                s.resolved_url().unwrap(),
                "https://www.youtube.com/feeds/videos.xml?channel_id=abc"
            );
        }

        #[test]
        fn test_reddit_subreddit_url() {
            let s = source("reddit", "subreddit = \"fpv\"");
            assert_eq!(s.resolved_url().unwrap(), "https://www.reddit.com/r/fpv/.json");
        }

        #[test]
        fn test_missing_fields() {
            assert!(source("rss", "").resolved_url().is_err());
            assert!(source("youtube", "").resolved_url().is_err());
            assert!(source("reddit", "").resolved_url().is_err());
        }
    }
}
