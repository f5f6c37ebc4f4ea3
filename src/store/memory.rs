//! In-process TTL store.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{KvStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Minimum spacing between full sweeps triggered by writes.
const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// A `DashMap`-backed store with lazy expiry.
///
/// Expired entries are dropped when touched. Writes also sweep the whole map
/// at most once per [`PURGE_INTERVAL`], so keys that are never read again
/// (closed rate-limit buckets, one-shot sessions) do not accumulate.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    last_purge: Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            last_purge: Mutex::new(Instant::now()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep if the last sweep is older than [`PURGE_INTERVAL`].
    ///
    /// Must not be called while holding an entry guard.
    fn maybe_purge(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_purge.lock();
            if now.duration_since(*last) < PURGE_INTERVAL {
                return;
            }
            *last = now;
        }
        let dropped = self.purge_expired();
        if dropped > 0 {
            tracing::debug!(dropped, remaining = self.entries.len(), "Purged expired store entries");
        }
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        self.entries.remove_if(key, |_, e| !e.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.maybe_purge();
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.maybe_purge();
        let now = Instant::now();
        // The entry guard holds the shard lock, so read-modify-write is atomic per key.
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: far_future(now),
        });
        if !entry.is_live(now) {
            entry.value = "0".to_string();
            entry.expires_at = far_future(now);
        }
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("{key} is not an integer")))?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Keys without a TTL behave like Redis keys with no expiry.
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(60 * 60 * 24 * 365)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.del("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_and_expire() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert!(store.expire("c", Duration::from_secs(2)).await.unwrap());
        assert_eq!(store.incr("c").await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integer() {
        let store = MemoryStore::new();
        store.set("s", "abc", Duration::from_secs(10)).await.unwrap();
        assert!(matches!(store.incr("s").await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        store.set("short", "1", Duration::from_secs(1)).await.unwrap();
        store.set("long", "1", Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_sweep_abandoned_keys() {
        let store = MemoryStore::new();

        // One short-lived counter per second, none of them read again.
        for i in 0..300 {
            let key = format!("ratelimit:ip:1:1:{i}");
            assert_eq!(store.incr(&key).await.unwrap(), 1);
            assert!(store.expire(&key, Duration::from_secs(1)).await.unwrap());
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        assert!(store.len() <= 31, "store kept {} expired keys", store.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_live_keys() {
        let store = MemoryStore::new();
        store.set("session:a", "{}", Duration::from_secs(3600)).await.unwrap();
        store.set("session:b", "{}", Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(PURGE_INTERVAL + Duration::from_secs(1)).await;
        store.set("session:c", "{}", Duration::from_secs(3600)).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("session:a").await.unwrap().as_deref(), Some("{}"));
    }
}
