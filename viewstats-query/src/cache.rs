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

//! Read-through result cache
//!
//! Keys are `"{prefix}:{endpoint}:{hash}"` where the hash is blake3 over the
//! canonical JSON of the endpoint parameters and the normalized filters.
//! `serde_json` objects serialize with sorted keys, so the key does not
//! depend on the order filters were supplied in.
//!
//! The cache is an optimization only: backend errors and undecodable entries
//! are logged and treated as misses.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use viewstats_core::{CacheConfig, FilterSpec};
use viewstats_storage::CacheBackend;

/// Freshly computed value and whether it may be cached
#[derive(Debug, Clone, PartialEq)]
pub struct Computed<T> {
    pub value: T,
    pub cacheable: bool,
}

impl<T> Computed<T> {
    pub fn cacheable(value: T) -> Self {
        Self {
            value,
            cacheable: true,
        }
    }

    /// Returned but not stored, e.g. an empty cold-start answer
    pub fn transient(value: T) -> Self {
        Self {
            value,
            cacheable: false,
        }
    }
}

pub struct ResultCache {
    backend: Option<Arc<dyn CacheBackend>>,
    prefix: String,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend: Some(backend),
            prefix: config.key_prefix.clone(),
            ttl: config.ttl(),
        }
    }

    /// Cache that never stores anything
    pub fn disabled(config: &CacheConfig) -> Self {
        Self {
            backend: None,
            prefix: config.key_prefix.clone(),
            ttl: config.ttl(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Deterministic key for `endpoint` called with `params` under `filter`
    pub fn key(&self, endpoint: &str, params: JsonValue, filter: &FilterSpec) -> String {
        let canonical = json!({
            "params": params,
            "filters": filter.canonical_json(),
        });
        let digest = blake3::hash(canonical.to_string().as_bytes());
        format!("{}:{}:{}", self.prefix, endpoint, hex::encode(digest.as_bytes()))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        match backend.get(key) {
            Ok(Some(bytes)) => match bincode::deserialize(&bytes) {
                Ok(value) => {
                    debug!(key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => {
                debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, computing result");
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let Some(backend) = &self.backend else {
            return;
        };
        let bytes = match bincode::serialize(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = backend.set(key, bytes, self.ttl) {
            warn!(key, error = %e, "Cache write failed, result not cached");
        }
    }

    /// Return the cached value for `key`, or compute, store and return it
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<Computed<T>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let computed = compute()?;
        if computed.cacheable {
            self.put(key, &computed.value);
        }
        Ok(computed.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::cell::Cell;
    use viewstats_core::{AnalyticsPoint, FilterLimits, FilterRequest};
    use viewstats_storage::MemoryCache;

    fn spec(request: FilterRequest) -> FilterSpec {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        FilterSpec::from_request(&request, now, &FilterLimits::default()).unwrap()
    }

    fn cache() -> (Arc<MemoryCache>, ResultCache) {
        let backend = Arc::new(MemoryCache::new());
        let cache = ResultCache::new(backend.clone(), &CacheConfig::default());
        (backend, cache)
    }

    #[test]
    fn test_key_is_order_independent() {
        let (_, cache) = cache();
        let a = spec(FilterRequest {
            country_codes: Some(vec!["US".into(), "DE".into()]),
            author_username: Some("alice".into()),
            ..Default::default()
        });
        let b = spec(FilterRequest {
            author_username: Some("alice".into()),
            country_codes: Some(vec!["DE".into(), "US".into()]),
            ..Default::default()
        });
        assert_eq!(
            cache.key("grouped", json!({"dimension": "country"}), &a),
            cache.key("grouped", json!({"dimension": "country"}), &b)
        );
        assert_ne!(
            cache.key("grouped", json!({"dimension": "country"}), &a),
            cache.key("grouped", json!({"dimension": "user"}), &a)
        );
    }

    #[test]
    fn test_key_format() {
        let (_, cache) = cache();
        let key = cache.key("top", json!({}), &FilterSpec::unfiltered());
        assert!(key.starts_with("analytics:top:"));
        assert_eq!(key.len(), "analytics:top:".len() + 64);
    }

    #[test]
    fn test_get_or_compute_reads_through() {
        let (_, cache) = cache();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(Computed::cacheable(vec![AnalyticsPoint::new("US", 2, 3.0)]))
        };

        let first: Vec<AnalyticsPoint> = cache.get_or_compute("k", compute).unwrap();
        let second: Vec<AnalyticsPoint> = cache.get_or_compute("k", compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_transient_values_not_stored() {
        let (backend, cache) = cache();
        let value: Vec<AnalyticsPoint> = cache
            .get_or_compute("k", || Ok(Computed::transient(Vec::new())))
            .unwrap();
        assert!(value.is_empty());
        assert_eq!(backend.get("k").unwrap(), None);
    }

    #[test]
    fn test_offline_backend_is_a_miss() {
        let (backend, cache) = cache();
        backend.set_offline(true);
        let value: u64 = cache
            .get_or_compute("k", || Ok(Computed::cacheable(7)))
            .unwrap();
        assert_eq!(value, 7);
    }
}
