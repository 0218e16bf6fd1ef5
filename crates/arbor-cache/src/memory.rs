//! In-memory shared cache
//!
//! Entries live for a fixed eviction window after they are set. Expired
//! entries are dropped lazily on read and eagerly when the cache is full.

use crate::traits::SharedCache;
use arbor_common::{CacheConfig, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Individual cache entry with its expiry deadline
struct CacheEntry {
    data: Bytes,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of reads that found a live entry
    pub hits: AtomicU64,
    /// Number of reads that found nothing (or an expired entry)
    pub misses: AtomicU64,
    /// Number of writes
    pub sets: AtomicU64,
    /// Number of explicit deletes that removed an entry
    pub deletes: AtomicU64,
    /// Number of entries dropped because their window elapsed
    pub expired: AtomicU64,
    /// Number of live entries dropped to make room
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.expired.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

/// Namespaced TTL cache held in process memory
pub struct MemoryCache {
    /// Cached entries keyed by namespaced key
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Namespace prefix prepended to every key
    prefix: String,
    /// Lifetime of an entry after it is set
    eviction: Duration,
    /// Maximum number of entries
    max_entries: usize,
    stats: CacheStats,
}

impl MemoryCache {
    /// Create a new cache
    pub fn new(prefix: impl Into<String>, eviction: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            prefix: prefix.into(),
            eviction,
            max_entries: max_entries.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Create a cache from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.prefix.clone(), config.eviction(), config.max_entries)
    }

    /// Get the namespace prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the eviction window
    pub const fn eviction(&self) -> Duration {
        self.eviction
    }

    /// Get cache statistics
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of entries currently held, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Check for a live entry without touching statistics
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .get(&self.namespaced(key))
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        self.purge_locked(&mut entries, Instant::now())
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn purge_locked(&self, entries: &mut HashMap<String, CacheEntry>, now: Instant) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        self.stats
            .expired
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Key of the entry closest to expiry
    fn find_oldest_entry(entries: &HashMap<String, CacheEntry>) -> Option<String> {
        entries
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone())
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>> {
        let key = self.namespaced(key);
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.data.clone()));
                }
                Some(_) => {}
                None => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        }

        // Expired: drop it unless a concurrent set refreshed it meanwhile
        let mut entries = self.entries.write();
        if entries.get(&key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(&key);
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let key = self.namespaced(key);
        let now = Instant::now();
        let mut entries = self.entries.write();

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            self.purge_locked(&mut entries, now);
            while entries.len() >= self.max_entries {
                let Some(evict_key) = Self::find_oldest_entry(&entries) else {
                    break;
                };
                debug!("Evicting cache entry {} to make room", evict_key);
                entries.remove(&evict_key);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                data: value,
                expires_at: now + self.eviction,
            },
        );
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.entries.write().remove(&self.namespaced(key)).is_some() {
            self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MemoryCache {
        MemoryCache::new("test.ns", Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = cache();
        cache.set("1,2", Bytes::from_static(b"4096")).await.unwrap();

        let value = cache.get_bytes("1,2").await.unwrap();
        assert_eq!(value, Some(Bytes::from_static(b"4096")));
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert!(cache.contains("1,2"));
    }

    #[tokio::test]
    async fn test_miss() {
        let cache = cache();
        assert_eq!(cache.get_bytes("1").await.unwrap(), None);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = cache();
        cache.set("1", Bytes::from_static(b"10")).await.unwrap();
        cache.delete("1").await.unwrap();
        cache.delete("never-set").await.unwrap();

        assert!(!cache.contains("1"));
        assert_eq!(cache.stats().deletes.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let a = MemoryCache::new("a", Duration::from_secs(60), 10);
        let b = MemoryCache::new("b", Duration::from_secs(60), 10);
        a.set("1,2", Bytes::from_static(b"10")).await.unwrap();
        b.set("1,2", Bytes::from_static(b"20")).await.unwrap();

        assert!(a.entries.read().contains_key("a:1,2"));
        assert_eq!(a.get_bytes("1,2").await.unwrap(), Some(Bytes::from_static(b"10")));
        assert_eq!(b.get_bytes("1,2").await.unwrap(), Some(Bytes::from_static(b"20")));

        a.delete("1,2").await.unwrap();
        assert!(!a.contains("1,2"));
        assert_eq!(b.get_bytes("1,2").await.unwrap(), Some(Bytes::from_static(b"20")));
        assert_eq!(b.stats().deletes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new("ttl", Duration::from_millis(20), 10);
        cache.set("1", Bytes::from_static(b"7")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!cache.contains("1"));
        assert_eq!(cache.get_bytes("1").await.unwrap(), None);
        assert_eq!(cache.stats().expired.load(Ordering::Relaxed), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_set_restarts_window() {
        let cache = MemoryCache::new("ttl", Duration::from_millis(80), 10);
        cache.set("1", Bytes::from_static(b"1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.set("1", Bytes::from_static(b"2")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            cache.get_bytes("1").await.unwrap(),
            Some(Bytes::from_static(b"2"))
        );
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = MemoryCache::new("cap", Duration::from_secs(60), 2);
        cache.set("1", Bytes::from_static(b"1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("2", Bytes::from_static(b"2")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("3", Bytes::from_static(b"3")).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("1"));
        assert!(cache.contains("2"));
        assert!(cache.contains("3"));
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_overwrite_at_capacity_does_not_evict() {
        let cache = MemoryCache::new("cap", Duration::from_secs(60), 1);
        cache.set("1", Bytes::from_static(b"1")).await.unwrap();
        cache.set("1", Bytes::from_static(b"2")).await.unwrap();
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new("ttl", Duration::from_millis(10), 10);
        cache.set("1", Bytes::from_static(b"1")).await.unwrap();
        cache.set("2", Bytes::from_static(b"2")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_hit_ratio() {
        let cache = cache();
        cache.set("1", Bytes::from_static(b"1")).await.unwrap();
        cache.get_bytes("1").await.unwrap();
        cache.get_bytes("2").await.unwrap();
        assert!((cache.stats().hit_ratio() - 0.5).abs() < 0.01);

        cache.stats().reset();
        assert!((cache.stats().hit_ratio() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_config() {
        let cache = MemoryCache::from_config(&CacheConfig::default());
        assert_eq!(cache.prefix(), "arbor.folder.size");
        assert_eq!(cache.eviction(), Duration::from_secs(300));
    }
}
