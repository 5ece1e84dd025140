//! LRU-with-TTL response cache. Expired entries are treated as a miss and
//! removed on read; a background sweep (see [`ResponseCache::sweep_expired`])
//! removes them proactively so memory doesn't accumulate stale entries
//! between reads.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use forge_core::CacheEntry;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        CacheStatsSnapshot {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

pub struct ResponseCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    default_ttl: Duration,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).expect("max_size clamped to at least 1");
        ResponseCache {
            inner: Mutex::new(LruCache::new(cap)),
            default_ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns `Some(response)` on a live hit; expired entries are removed
    /// and counted as both an expiration and a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut guard = self.inner.lock();
        let now = Utc::now();
        match guard.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                guard.pop(key);
                drop(guard);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = now;
                let response = entry.response.clone();
                drop(guard);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(response)
            }
            None => {
                drop(guard);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: String, response: Value) {
        self.put_with_ttl(key, response, self.default_ttl)
    }

    pub fn put_with_ttl(&self, key: String, response: Value, ttl: Duration) {
        let now = Utc::now();
        let entry = CacheEntry {
            response,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            access_count: 0,
            last_accessed: now,
        };
        let mut guard = self.inner.lock();
        if let Some((evicted_key, _)) = guard.push(key.clone(), entry) {
            if evicted_key != key {
                drop(guard);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// Remove every expired entry. Intended to be driven by a periodic
    /// background task; also invoked implicitly by `get`.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        let mut guard = self.inner.lock();
        let expired_keys: Vec<String> = guard
            .iter()
            .filter(|(_, v)| v.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired_keys {
            guard.pop(key);
        }
        drop(guard);
        if !expired_keys.is_empty() {
            self.stats
                .expirations
                .fetch_add(expired_keys.len() as u64, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_after_put() {
        let cache = ResponseCache::new(16, Duration::from_secs(60));
        assert!(cache.get("k").is_none());
        cache.put("k".to_string(), serde_json::json!({"v": 1}));
        assert_eq!(cache.get("k"), Some(serde_json::json!({"v": 1})));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn expired_entry_is_treated_as_miss_and_removed() {
        let cache = ResponseCache::new(16, Duration::from_millis(1));
        cache.put("k".to_string(), serde_json::json!(1));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn max_size_one_evicts_previous_entry_on_each_insert() {
        let cache = ResponseCache::new(1, Duration::from_secs(60));
        cache.put("a".to_string(), serde_json::json!(1));
        cache.put("b".to_string(), serde_json::json!(2));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(serde_json::json!(2)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn sweep_removes_expired_entries_without_a_read() {
        let cache = ResponseCache::new(16, Duration::from_millis(1));
        cache.put("k".to_string(), serde_json::json!(1));
        std::thread::sleep(Duration::from_millis(20));
        cache.sweep_expired();
        assert_eq!(cache.stats().expirations, 1);
    }
}
