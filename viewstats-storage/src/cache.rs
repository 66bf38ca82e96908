// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Key/value cache backend
//!
//! [`MemoryCache`] is bounded by a `moka` cache with per-entry expiry, so
//! result entries and lock entries can carry different TTLs.

use crate::error::BackendError;
use moka::sync::Cache;
use moka::Expiry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use viewstats_core::CacheConfig;

const BACKEND: &str = "cache";

/// Default maximum number of entries
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Shared cache used for query results and cache-backed locks
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), BackendError>;

    /// Store only if no live entry exists. Returns whether this call stored it.
    fn add_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool, BackendError>;

    fn delete(&self, key: &str) -> Result<(), BackendError>;
}

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded in-process cache.
///
/// Can be switched offline to simulate an unreachable cache server; every
/// operation then fails with [`BackendError::Unavailable`].
pub struct MemoryCache {
    cache: Cache<String, Entry>,
    offline: AtomicBool,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_capacity(config.max_capacity)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryTtl)
            .build();
        Self {
            cache,
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Get current number of entries in the cache
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable(BACKEND, "connection refused"));
        }
        Ok(())
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.ensure_online()?;
        Ok(self.cache.get(key).map(|e| e.value))
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), BackendError> {
        self.ensure_online()?;
        self.cache.insert(key.to_string(), Entry { value, ttl });
        Ok(())
    }

    fn add_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        self.ensure_online()?;
        let entry = self
            .cache
            .entry(key.to_string())
            .or_insert_with(|| Entry { value, ttl });
        Ok(entry.is_fresh())
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        self.ensure_online()?;
        self.cache.invalidate(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_set_get_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").unwrap(), None);
        cache.set("k", b"v".to_vec(), TTL).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
        cache.delete("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_add_if_absent() {
        let cache = MemoryCache::new();
        assert!(cache.add_if_absent("lock", b"1".to_vec(), TTL).unwrap());
        assert!(!cache.add_if_absent("lock", b"2".to_vec(), TTL).unwrap());
        assert_eq!(cache.get("lock").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("short", b"v".to_vec(), Duration::from_millis(20))
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("short").unwrap(), None);
        assert!(cache.add_if_absent("short", b"w".to_vec(), TTL).unwrap());
    }

    #[test]
    fn test_offline_cache_fails_every_call() {
        let cache = MemoryCache::new();
        cache.set_offline(true);
        assert!(matches!(cache.get("k"), Err(BackendError::Unavailable { .. })));
        assert!(cache.set("k", vec![], TTL).is_err());
        assert!(cache.add_if_absent("k", vec![], TTL).is_err());
        cache.set_offline(false);
        assert!(cache.get("k").unwrap().is_none());
    }
}
