//! Process-local TTL cache for query results.
//!
//! Entries expire lazily on read; there is no background sweeper and no size
//! bound, so writers are expected to reuse a small, stable key space
//! (`users:<filter-hash>` style) and invalidate on mutation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) > self.ttl
    }
}

/// Injected via `AppState`, never a process-wide singleton.
#[derive(Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl: ttl.unwrap_or(DEFAULT_TTL),
            },
        );
    }

    /// Returns the cached value, dropping the entry if its TTL has elapsed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                Some(entry) if !entry.expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: take the write lock and remove, re-checking under it.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(key).is_some_and(|e| e.expired(now)) {
            entries.remove(key);
        }
        None
    }

    /// Removes every key containing `pattern` as a substring. O(n) scan.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_before_expiry_returns_value() {
        let cache = QueryCache::new();
        cache.set("users:all", json!([1, 2, 3]), Some(Duration::from_millis(100)));
        assert_eq!(cache.get("users:all"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn get_after_expiry_returns_none_and_drops_entry() {
        let cache = QueryCache::new();
        cache.set("users:all", json!(1), Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("users:all"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn missing_key_returns_none() {
        let cache = QueryCache::new();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn set_overwrites_and_resets_ttl() {
        let cache = QueryCache::new();
        cache.set("k", json!("old"), Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(15));
        cache.set("k", json!("new"), Some(Duration::from_millis(200)));
        assert_eq!(cache.get("k"), Some(json!("new")));
    }

    #[test]
    fn invalidate_removes_all_and_only_matching_keys() {
        let cache = QueryCache::new();
        cache.set("users:page1", json!(1), None);
        cache.set("users:page2", json!(2), None);
        cache.set("schools:page1", json!(3), None);

        let removed = cache.invalidate("users:");
        assert_eq!(removed, 2);
        assert_eq!(cache.get("users:page1"), None);
        assert_eq!(cache.get("users:page2"), None);
        assert_eq!(cache.get("schools:page1"), Some(json!(3)));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = QueryCache::new();
        cache.set("a", json!(1), None);
        cache.set("b", json!(2), None);
        cache.clear();
        assert!(cache.is_empty());
    }
}
