//! TTL cache for resolved option lists.
//!
//! Shared across every field (and every step) that uses the same
//! [`OptionsCache`] handle. Keys are `"{prefix}:{digest}"` where the digest
//! is the SHA-256 of the dependency snapshot's canonical JSON, so two
//! fields with the same prefix and the same dependency values share an
//! entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use super::SelectOption;
use crate::values::{values_to_json, FormValues};

/// Cache key for a prefix and a dependency snapshot.
///
/// `FormValues` is ordered, so equal snapshots always serialize to the
/// same bytes.
pub fn cache_key(prefix: &str, dependencies: &FormValues) -> String {
    let canonical = values_to_json(dependencies).to_string();
    format!("{}:{:x}", prefix, Sha256::digest(canonical.as_bytes()))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    options: Vec<SelectOption>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// Cloneable handle to a shared options cache.
#[derive(Debug, Clone, Default)]
pub struct OptionsCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl OptionsCache {
    pub fn new() -> Self {
        OptionsCache::default()
    }

    /// Cached options for `key`, if stored less than `max_age` ago.
    /// Expired entries are evicted on lookup.
    pub fn get(&self, key: &str, max_age: Duration) -> Option<Vec<SelectOption>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < max_age => Some(entry.options.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `options` for `ttl`. A zero `ttl` stores nothing. Entries
    /// past their own `ttl` are swept on every insert, so keys that are
    /// never looked up again do not pile up.
    pub fn insert(&self, key: impl Into<String>, options: Vec<SelectOption>, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| entry.is_live());
        if ttl.is_zero() {
            return;
        }
        entries.insert(
            key.into(),
            CacheEntry {
                options,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Drop every entry stored under `prefix`. Returns how many were removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let marker = format!("{}:", prefix);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&marker));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deps(country: &str) -> FormValues {
        let mut v = FormValues::new();
        v.insert("country".to_string(), json!(country));
        v
    }

    #[test]
    fn keys_depend_on_prefix_and_snapshot() {
        let a = cache_key("city", &deps("VN"));
        assert_eq!(a, cache_key("city", &deps("VN")));
        assert_ne!(a, cache_key("city", &deps("FR")));
        assert_ne!(a, cache_key("town", &deps("VN")));
        assert!(a.starts_with("city:"));
    }

    #[test]
    fn entries_expire() {
        let cache = OptionsCache::new();
        cache.insert("k:1", vec![SelectOption::new("a", "A")], Duration::from_secs(60));
        assert!(cache.get("k:1", Duration::from_secs(60)).is_some());
        assert!(cache.get("k:1", Duration::ZERO).is_none());
        // Expired lookups evict.
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_is_not_stored() {
        let cache = OptionsCache::new();
        cache.insert("k:1", vec![SelectOption::new("a", "A")], Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_sweeps_expired_entries() {
        let cache = OptionsCache::new();
        for i in 0..10 {
            cache.insert(format!("k:{}", i), vec![], Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("k:last", vec![], Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("k:last", Duration::from_secs(60)).is_some());
    }

    #[test]
    fn handles_share_entries_and_prefix_invalidation() {
        let cache = OptionsCache::new();
        let other = cache.clone();
        let ttl = Duration::from_secs(60);
        cache.insert("city:1", vec![], ttl);
        cache.insert("city:2", vec![], ttl);
        cache.insert("cityhall:1", vec![], ttl);
        assert_eq!(other.len(), 3);
        assert_eq!(other.invalidate_prefix("city"), 2);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(other.is_empty());
    }
}
