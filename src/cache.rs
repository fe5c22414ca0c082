//! Time-to-live cache for slow external lookups.
//!
//! Entries are visible while `now - stored_at < ttl(category)`; expired
//! entries are evicted on the next read, never swept proactively.

use crate::config::CacheConfig;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: String,
    stored_at: Instant,
    category: String,
}

/// Keyed TTL cache with per-category lifetimes.
pub struct ResponseCache {
    ttls: HashMap<String, Duration>,
    default_ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Create a cache from configuration.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let ttls = config
            .ttl_secs
            .iter()
            .map(|(category, secs)| (category.clone(), Duration::from_secs(*secs)))
            .collect();
        Self {
            ttls,
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a live value, evicting it if its TTL has elapsed.
    #[must_use]
    pub fn get(&self, key: &str, category: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(key) {
            if entry.stored_at.elapsed() < self.ttl_for(category) {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    /// Store a value under a category.
    pub fn set(&self, key: &str, value: &str, category: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_owned(),
            CacheEntry {
                value: value.to_owned(),
                stored_at: Instant::now(),
                category: category.to_owned(),
            },
        );
    }

    /// Drop all entries, or only those in `category`.
    pub fn clear(&self, category: Option<&str>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match category {
            Some(category) => entries.retain(|_, entry| entry.category != category),
            None => entries.clear(),
        }
    }

    fn ttl_for(&self, category: &str) -> Duration {
        self.ttls.get(category).copied().unwrap_or(self.default_ttl)
    }
}
