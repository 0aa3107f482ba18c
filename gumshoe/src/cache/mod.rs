//! In-memory TTL cache.
//!
//! Each entry carries its own expiry computed from the injected [`Clock`].
//! Eviction is lazy: a stale entry is dropped when it is next read and is
//! otherwise treated as absent. There is no background sweeper.
//!
//! Concurrent misses on the same key are not deduplicated; whichever writer
//! finishes last wins.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::clock::Clock;

/// A cached value with its expiration time.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe key/value cache with per-entry expiry.
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Get a fresh value.
    ///
    /// Returns None if the key is missing or its entry has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;

        if entry.is_expired(self.clock.now()) {
            drop(entry); // Release the shard lock before removing
            self.entries
                .remove_if(key, |_, entry| entry.is_expired(self.clock.now()));
            return None;
        }

        Some(entry.value.clone())
    }

    /// Insert or overwrite a value that stays fresh for `ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: self.clock.now() + ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Whether a fresh value exists for `key`.
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key regardless of freshness.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Number of stored entries, including stale ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
