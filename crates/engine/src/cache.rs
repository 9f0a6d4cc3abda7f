//! Injected key/value cache with per-entry TTL
//!
//! Callers own the cache and pass it where it is needed; nothing here is a
//! process-wide singleton.

use std::hash::Hash;
use std::time::{Duration, Instant};

use moka::sync::Cache as MokaCache;
use moka::Expiry;

/// Minimal cache capability used by the collaborator seams
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V, ttl: Duration);
}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    ttl: Duration,
}

struct PerEntryTtl;

impl<K, V> Expiry<K, Entry<V>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &K,
        value: &Entry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &Entry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory bounded cache backed by `moka`
pub struct TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: MokaCache<K, Entry<V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: MokaCache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.invalidate(key);
    }
}

impl<K, V> Cache<K, V> for TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|e| e.value)
    }

    fn put(&self, key: K, value: V, ttl: Duration) {
        self.inner.insert(key, Entry { value, ttl });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let cache: TtlCache<String, f64> = TtlCache::new(16);
        cache.put("SPY".to_string(), 512.0, Duration::from_secs(60));
        assert_eq!(cache.get(&"SPY".to_string()), Some(512.0));
        assert_eq!(cache.get(&"QQQ".to_string()), None);
    }

    #[test]
    fn test_entry_expires() {
        let cache: TtlCache<&'static str, i32> = TtlCache::new(16);
        cache.put("k", 1, Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn test_overwrite_and_invalidate() {
        let cache: TtlCache<&'static str, i32> = TtlCache::new(16);
        cache.put("k", 1, Duration::from_secs(60));
        cache.put("k", 2, Duration::from_secs(60));
        assert_eq!(cache.get(&"k"), Some(2));
        cache.invalidate(&"k");
        assert_eq!(cache.get(&"k"), None);
    }
}
