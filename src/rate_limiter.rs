//! Per-host admission control for outbound requests.
//!
//! [`RateLimiter`] keeps the last request time per host in process.
//! [`DistributedRateLimiter`] delegates to an [`AtomicStore`] so several
//! aggregator processes share one budget per host.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::warn;

use crate::cache::saturating_deadline;
use crate::error::StoreError;

/// Enforces a minimum interval between requests to the same host.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a request to `host` if the interval has elapsed, recording it.
    ///
    /// Returns `false` without touching state when called too soon.
    pub async fn allow(&self, host: &str) -> bool {
        let now = Instant::now();
        let mut last_request = self.last_request.lock().await;
        match last_request.get(host) {
            Some(last) if now.saturating_duration_since(*last) < self.min_interval => false,
            _ => {
                last_request.insert(host.to_string(), now);
                true
            }
        }
    }

    /// Sleep until a request to `host` is admitted, then record it.
    ///
    /// Nothing is recorded until the request is admitted, so dropping the
    /// future mid-sleep leaves the host's window untouched. Waiters that wake
    /// together re-check, and all but one go back to sleep.
    pub async fn wait(&self, host: &str) {
        if self.min_interval.is_zero() {
            return;
        }

        loop {
            let next = {
                let now = Instant::now();
                let mut last_request = self.last_request.lock().await;
                match last_request.get(host) {
                    Some(last) if now.saturating_duration_since(*last) < self.min_interval => {
                        saturating_deadline(*last, self.min_interval)
                    }
                    _ => {
                        last_request.insert(host.to_string(), now);
                        return;
                    }
                }
            };
            sleep_until(next).await;
        }
    }

    pub async fn reset(&self, host: &str) {
        self.last_request.lock().await.remove(host);
    }

    pub async fn reset_all(&self) {
        self.last_request.lock().await.clear();
    }

    pub async fn tracked_hosts(&self) -> usize {
        self.last_request.lock().await.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Host portion of `url`, used as the rate-limit key.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// External store offering an atomic "set if absent, with expiry".
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Returns `Ok(true)` if the key was absent and is now set for `ttl`,
    /// `Ok(false)` if it already existed.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
}

/// Rate limiter backed by a shared [`AtomicStore`].
///
/// Backend errors admit the request.
pub struct DistributedRateLimiter {
    store: Arc<dyn AtomicStore>,
    min_interval: Duration,
}

impl DistributedRateLimiter {
    const KEY_PREFIX: &'static str = "ratelimit:";

    pub fn new(store: Arc<dyn AtomicStore>, min_interval: Duration) -> Self {
        Self {
            store,
            min_interval,
        }
    }

    pub async fn allow(&self, host: &str) -> bool {
        let key = format!("{}{}", Self::KEY_PREFIX, host);
        match self.store.set_if_absent(&key, self.min_interval).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(host = %host, error = %e, "rate limit backend failed, allowing request");
                true
            }
        }
    }
}

/// In-process [`AtomicStore`], for single-node deployments and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if let Some(expires_at) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), saturating_deadline(now, ttl));
        Ok(true)
    }
}
