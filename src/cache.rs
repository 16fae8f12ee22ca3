//! Short-TTL read cache for stock counts. Writers (the settlement worker
//! and the restock endpoint) refresh or invalidate entries; readers fall
//! through to the ledger on a miss.

use dashmap::DashMap;

use crate::state::now_epoch_ms;

#[derive(Debug, Clone, Copy)]
struct CachedStock {
    remaining: i64,
    stored_at_ms: i64,
}

pub struct StockReadCache {
    entries: DashMap<String, CachedStock>,
    ttl_ms: i64,
}

impl StockReadCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self { entries: DashMap::new(), ttl_ms }
    }

    /// Returns the cached count, or None when the entry is absent or stale.
    pub fn get(&self, item_id: &str) -> Option<i64> {
        let entry = self.entries.get(item_id)?;
        if now_epoch_ms() - entry.stored_at_ms >= self.ttl_ms {
            return None;
        }
        Some(entry.remaining)
    }

    pub fn store(&self, item_id: &str, remaining: i64) {
        self.entries.insert(
            item_id.to_string(),
            CachedStock { remaining, stored_at_ms: now_epoch_ms() },
        );
    }

    pub fn invalidate(&self, item_id: &str) {
        self.entries.remove(item_id);
    }

    pub fn prune(&self) -> usize {
        let cutoff = now_epoch_ms() - self.ttl_ms;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.stored_at_ms > cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_unknown_item() {
        let cache = StockReadCache::new(1_000);
        assert_eq!(cache.get("sneaker-001"), None);
    }

    #[test]
    fn fresh_entry_is_served() {
        let cache = StockReadCache::new(60_000);
        cache.store("sneaker-001", 42);
        assert_eq!(cache.get("sneaker-001"), Some(42));
    }

    #[test]
    fn stale_entry_is_a_miss() {
        let cache = StockReadCache::new(10);
        cache.store("sneaker-001", 42);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(cache.get("sneaker-001"), None);
    }

    #[test]
    fn store_overwrites_previous_count() {
        let cache = StockReadCache::new(60_000);
        cache.store("sneaker-001", 42);
        cache.store("sneaker-001", 41);
        assert_eq!(cache.get("sneaker-001"), Some(41));
    }

    #[test]
    fn invalidate_forces_fallthrough() {
        let cache = StockReadCache::new(60_000);
        cache.store("sneaker-001", 42);
        cache.invalidate("sneaker-001");
        assert_eq!(cache.get("sneaker-001"), None);
    }

    #[test]
    fn prune_evicts_stale_entries() {
        let cache = StockReadCache::new(10);
        cache.store("a", 1);
        cache.store("b", 2);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(cache.prune(), 2);
        assert_eq!(cache.len(), 0);
    }
}
