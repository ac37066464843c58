//! Client-keyed cache of supplementary resources (spec §4.5).
//!
//! A request may carry a `cache-id` plus a set of supplementary
//! `CodeSystem`/`ValueSet` resources it wants remembered across calls
//! (e.g. a client incrementally building up a compose). Inserts are
//! idempotent: the same `(resourceType, url, version)` triple always
//! last-write-wins rather than accumulating duplicates. Buckets untouched
//! for longer than `max_age` are pruned.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ResourceKey {
    resource_type: String,
    url: String,
    version: Option<String>,
}

struct ClientBucket {
    resources: DashMap<ResourceKey, Value>,
    last_touched: Mutex<Instant>,
}

impl ClientBucket {
    fn new() -> Self {
        Self {
            resources: DashMap::new(),
            last_touched: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_touched.lock().unwrap() = Instant::now();
    }

    fn age(&self) -> Duration {
        self.last_touched.lock().unwrap().elapsed()
    }
}

/// Cache of per-client supplementary resources, keyed by `cache-id`.
pub struct ResourceCache {
    max_age: Duration,
    buckets: DashMap<String, ClientBucket>,
}

impl ResourceCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            buckets: DashMap::new(),
        }
    }

    /// Idempotently merge `resources` into the bucket for `cache_id`. Each
    /// resource must carry `resourceType` and `url`; an existing entry with
    /// the same `(resourceType, url, version)` is overwritten.
    pub fn merge(&self, cache_id: &str, resources: impl IntoIterator<Item = Value>) {
        let bucket = self
            .buckets
            .entry(cache_id.to_string())
            .or_insert_with(ClientBucket::new);
        bucket.touch();
        for resource in resources {
            let Some(resource_type) = resource
                .get("resourceType")
                .and_then(|v| v.as_str())
                .map(String::from)
            else {
                continue;
            };
            let Some(url) = resource.get("url").and_then(|v| v.as_str()).map(String::from) else {
                continue;
            };
            let version = resource
                .get("version")
                .and_then(|v| v.as_str())
                .map(String::from);
            bucket.resources.insert(
                ResourceKey {
                    resource_type,
                    url,
                    version,
                },
                resource,
            );
        }
    }

    /// Look up one supplementary resource by identity, touching the bucket
    /// so it isn't pruned while still in active use.
    pub fn get(
        &self,
        cache_id: &str,
        resource_type: &str,
        url: &str,
        version: Option<&str>,
    ) -> Option<Value> {
        let bucket = self.buckets.get(cache_id)?;
        bucket.touch();
        bucket
            .resources
            .get(&ResourceKey {
                resource_type: resource_type.to_string(),
                url: url.to_string(),
                version: version.map(String::from),
            })
            .map(|r| r.clone())
    }

    /// All resources of `resource_type` in a client's bucket, e.g. every
    /// `CodeSystem` supplied inline for this expansion.
    pub fn all_of_type(&self, cache_id: &str, resource_type: &str) -> Vec<Value> {
        let Some(bucket) = self.buckets.get(cache_id) else {
            return Vec::new();
        };
        bucket.touch();
        bucket
            .resources
            .iter()
            .filter(|e| e.key().resource_type == resource_type)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Drop every bucket untouched for longer than `max_age`.
    pub fn prune(&self) {
        self.buckets.retain(|_, bucket| bucket.age() <= self.max_age);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
