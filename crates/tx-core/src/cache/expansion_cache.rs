//! Content-hash keyed cache of expensive `$expand` results (spec §4.5).
//!
//! Unlike [`crate::cache::resource_cache::ResourceCache`] this cache is not
//! keyed by client identity: the key is a SHA-256 hash over the expansion
//! target, its parameters, and the hashes of any additional resources
//! supplied, so two clients asking for byte-identical expansions share a
//! cache entry. Only expansions that took longer than
//! `min_duration_to_admit` to compute are worth caching; everything else is
//! cheap enough to recompute. Entries are evicted once unused for longer
//! than `max_age`, and debugger-initiated requests bypass the cache
//! entirely so a developer always sees fresh computation.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub struct CachedExpansion {
    pub expansion: Value,
    created_at: Instant,
    last_used: Mutex<Instant>,
    hit_count: std::sync::atomic::AtomicU64,
    pub compute_duration: Duration,
}

impl CachedExpansion {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap() = Instant::now();
        self.hit_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().unwrap().elapsed()
    }
}

/// Compute the cache key for an expansion: a SHA-256 hash over the
/// canonical target vurl, a canonicalized JSON parameter set, and the
/// hashes of any inline additional resources.
pub fn expansion_key(target_vurl: &str, params: &Value, additional_resource_hashes: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target_vurl.as_bytes());
    hasher.update(b"\0");
    hasher.update(params.to_string().as_bytes());
    for h in additional_resource_hashes {
        hasher.update(b"\0");
        hasher.update(h.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Hash a single additional resource for inclusion in [`expansion_key`].
pub fn hash_resource(resource: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct ExpansionCache {
    max_age: Duration,
    min_duration_to_admit: Duration,
    capacity: usize,
    entries: DashMap<String, CachedExpansion>,
}

impl ExpansionCache {
    pub fn new(max_age: Duration, min_duration_to_admit: Duration, capacity: usize) -> Self {
        Self {
            max_age,
            min_duration_to_admit,
            capacity,
            entries: DashMap::new(),
        }
    }

    /// Look up a cached expansion by key, bumping its hit count. Returns
    /// `None` when `debugging` is set, so a developer always recomputes.
    pub fn get(&self, key: &str, debugging: bool) -> Option<Value> {
        if debugging {
            return None;
        }
        let entry = self.entries.get(key)?;
        entry.touch();
        Some(entry.expansion.clone())
    }

    /// Offer a freshly computed expansion for admission. Only admitted if
    /// it took longer than `min_duration_to_admit` to compute; cheap
    /// expansions aren't worth the memory.
    pub fn offer(&self, key: String, expansion: Value, compute_duration: Duration) {
        if compute_duration < self.min_duration_to_admit {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            CachedExpansion {
                expansion,
                created_at: Instant::now(),
                last_used: Mutex::new(Instant::now()),
                hit_count: std::sync::atomic::AtomicU64::new(0),
                compute_duration,
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .max_by_key(|e| e.value().idle_for())
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Drop every entry idle for longer than `max_age`.
    pub fn prune(&self) {
        self.entries.retain(|_, entry| entry.idle_for() <= self.max_age);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_stable_for_identical_inputs() {
        let params = json!({"offset": 0, "count": 20});
        let a = expansion_key("http://example.org/vs|1.0", &params, &[]);
        let b = expansion_key("http://example.org/vs|1.0", &params, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn key_differs_on_additional_resources() {
        let params = json!({});
        let a = expansion_key("http://example.org/vs", &params, &[]);
        let b = expansion_key("http://example.org/vs", &params, &["abc".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn cheap_expansions_are_not_admitted() {
        let cache = ExpansionCache::new(Duration::from_secs(60), Duration::from_millis(2000), 10);
        cache.offer("k".into(), json!({"expansion": true}), Duration::from_millis(5));
        assert!(cache.is_empty());
    }

    #[test]
    fn expensive_expansions_are_admitted_and_hit() {
        let cache = ExpansionCache::new(Duration::from_secs(60), Duration::from_millis(2000), 10);
        cache.offer(
            "k".into(),
            json!({"expansion": true}),
            Duration::from_millis(2500),
        );
        let hit = cache.get("k", false);
        assert!(hit.is_some());
        assert_eq!(cache.entries.get("k").unwrap().hit_count(), 1);
    }

    #[test]
    fn debugging_bypasses_lookup() {
        let cache = ExpansionCache::new(Duration::from_secs(60), Duration::from_millis(2000), 10);
        cache.offer(
            "k".into(),
            json!({"expansion": true}),
            Duration::from_millis(2500),
        );
        assert!(cache.get("k", true).is_none());
    }

    #[test]
    fn prune_drops_idle_entries() {
        let cache = ExpansionCache::new(Duration::from_millis(0), Duration::from_millis(0), 10);
        cache.offer("k".into(), json!({}), Duration::from_millis(2500));
        std::thread::sleep(Duration::from_millis(5));
        cache.prune();
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_makes_room_at_capacity() {
        let cache = ExpansionCache::new(Duration::from_secs(60), Duration::from_millis(0), 2);
        cache.offer("a".into(), json!({}), Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(2));
        cache.offer("b".into(), json!({}), Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(2));
        cache.offer("c".into(), json!({}), Duration::from_millis(10));
        assert_eq!(cache.len(), 2);
    }
}
