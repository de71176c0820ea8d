//! Generic key/value store with per-entry expiry.
//!
//! Expired entries are invisible to readers immediately; a background sweep
//! removes them from memory on a fixed tick.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shortest period the background sweep will run at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline used when `start + wait` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + wait`, capped at a far-future deadline instead of overflowing.
pub(crate) fn saturating_deadline(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

type Store<K, V> = RwLock<HashMap<K, CacheEntry<V>>>;

pub struct Cache<K, V> {
    entries: Arc<Store<K, V>>,
    default_ttl: Duration,
    sweep: CancellationToken,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache and start its sweep task.
    ///
    /// A sweep interval below [`MIN_SWEEP_INTERVAL`] is raised to it. Must be
    /// called from within a tokio runtime.
    pub fn new(default_ttl: Duration, sweep_interval: Duration) -> Self {
        let sweep_interval = if sweep_interval < MIN_SWEEP_INTERVAL {
            warn!(
                requested_ms = sweep_interval.as_millis() as u64,
                "cache sweep interval too short, using minimum"
            );
            MIN_SWEEP_INTERVAL
        } else {
            sweep_interval
        };

        let entries: Arc<Store<K, V>> = Arc::new(RwLock::new(HashMap::new()));
        let sweep = CancellationToken::new();

        tokio::spawn(run_sweep(
            Arc::downgrade(&entries),
            sweep_interval,
            sweep.clone(),
        ));

        Self {
            entries,
            default_ttl,
            sweep,
        }
    }

    /// Returns the value for `key` unless it is absent or expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    pub async fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: saturating_deadline(Instant::now(), ttl),
        };
        self.entries.write().await.insert(key, entry);
    }

    pub async fn delete(&self, key: &K) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn invalidate(&self, key: &K) -> bool {
        self.delete(key).await
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of entries that have not expired.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        purge(&self.entries).await
    }

    /// Stop the background sweep. Lazy expiry on read still applies.
    pub fn stop(&self) {
        self.sweep.cancel();
    }

    #[cfg(test)]
    async fn raw_len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl<K, V> Drop for Cache<K, V> {
    fn drop(&mut self) {
        self.sweep.cancel();
    }
}

async fn purge<K, V>(entries: &Store<K, V>) -> usize
where
    K: Eq + Hash,
{
    let now = Instant::now();
    let mut entries = entries.write().await;
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

async fn run_sweep<K, V>(entries: Weak<Store<K, V>>, every: Duration, stop: CancellationToken)
where
    K: Eq + Hash,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let Some(entries) = entries.upgrade() else { break };
                let removed = purge(&entries).await;
                if removed > 0 {
                    debug!(removed, "cache sweep evicted expired entries");
                }
            }
        }
    }
}
