use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Shared TTL cache for read-mostly state (guild settings, invite counts).
///
/// Writers must call `invalidate` after touching the backing row; expiry alone
/// is not enough to keep permission-relevant data fresh.
pub struct TtlCache<K, V> {
    entries: Arc<DashMap<K, (V, Instant)>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        let entries = Arc::new(DashMap::new());
        let cleaner_entries = Arc::clone(&entries);

        // Spawn cleanup task
        tokio::spawn(async move {
            loop {
                sleep(ttl.max(Duration::from_secs(10))).await;
                let now = Instant::now();
                cleaner_entries.retain(|_, (_, stored)| now.duration_since(*stored) < ttl);
            }
        });

        Self { entries, ttl }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        let (value, stored) = entry.value();
        if stored.elapsed() < self.ttl {
            Some(value.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hit_before_expiry() {
        let cache: TtlCache<u64, &'static str> = TtlCache::new(Duration::from_secs(30));
        cache.insert(1, "a");
        assert_eq!(cache.get(&1), Some("a"));
        assert_eq!(cache.get(&2), None);
    }

    #[tokio::test]
    async fn test_miss_after_expiry() {
        let cache: TtlCache<u64, &'static str> = TtlCache::new(Duration::from_millis(20));
        cache.insert(1, "a");
        sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(&1), None);
    }

    #[tokio::test]
    async fn test_invalidate_wins_over_ttl() {
        let cache: TtlCache<u64, &'static str> = TtlCache::new(Duration::from_secs(30));
        cache.insert(1, "a");
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
    }
}
