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

//! Cross-process lock for the precompute job
//!
//! Backends are tried in order: the shared cache (`add_if_absent` with a
//! TTL), then a database advisory lock. The first backend that answers
//! decides: acquired, or held by another run. A backend that cannot be
//! reached passes to the next one. When none can be reached the configured
//! [`LockPolicy`] decides whether the run proceeds unguarded.
//!
//! The returned [`LockGuard`] releases on drop. Release is best-effort.

use crate::error::{AnalyticsError, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use viewstats_core::{LockPolicy, PrecomputeConfig};
use viewstats_storage::{AdvisoryLocks, BackendError, CacheBackend};

trait LockBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(false)` when the lock is held elsewhere
    fn try_acquire(&self, key: &str, ttl: Duration) -> std::result::Result<bool, BackendError>;

    fn release(&self, key: &str) -> std::result::Result<(), BackendError>;
}

struct CacheLock(Arc<dyn CacheBackend>);

impl LockBackend for CacheLock {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn try_acquire(&self, key: &str, ttl: Duration) -> std::result::Result<bool, BackendError> {
        self.0.add_if_absent(key, b"locked".to_vec(), ttl)
    }

    fn release(&self, key: &str) -> std::result::Result<(), BackendError> {
        self.0.delete(key)
    }
}

struct AdvisoryLock {
    locks: Arc<dyn AdvisoryLocks>,
    id: i64,
}

impl LockBackend for AdvisoryLock {
    fn name(&self) -> &'static str {
        "advisory"
    }

    fn try_acquire(&self, _key: &str, _ttl: Duration) -> std::result::Result<bool, BackendError> {
        self.locks.try_advisory_lock(self.id)
    }

    fn release(&self, _key: &str) -> std::result::Result<(), BackendError> {
        self.locks.advisory_unlock(self.id)
    }
}

/// How a run came to hold (or not hold) the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Granted by the named backend
    Acquired(&'static str),
    /// No backend reachable; proceeding under fail-open policy
    Unguarded,
    /// Forced run; acquisition skipped
    Skipped,
}

impl fmt::Display for LockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockOutcome::Acquired(backend) => write!(f, "acquired via {}", backend),
            LockOutcome::Unguarded => f.write_str("unguarded"),
            LockOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

/// Held lock; released when dropped
pub struct LockGuard {
    key: String,
    holder: Option<Arc<dyn LockBackend>>,
    outcome: LockOutcome,
}

impl LockGuard {
    /// Guard for a forced run that never asked for the lock
    pub fn skipped(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            holder: None,
            outcome: LockOutcome::Skipped,
        }
    }

    fn unguarded(key: &str) -> Self {
        Self {
            key: key.to_string(),
            holder: None,
            outcome: LockOutcome::Unguarded,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn outcome(&self) -> LockOutcome {
        self.outcome
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(holder) = self.holder.take() {
            match holder.release(&self.key) {
                Ok(()) => debug!(key = %self.key, backend = holder.name(), "Lock released"),
                Err(e) => warn!(key = %self.key, error = %e, "Failed to release lock"),
            }
        }
    }
}

/// Lock fallback chain
pub struct DistributedLock {
    chain: Vec<Arc<dyn LockBackend>>,
    advisory_id: i64,
    policy: LockPolicy,
}

impl DistributedLock {
    /// Chain with no backends yet; add them with [`with_cache`](Self::with_cache)
    /// and [`with_advisory`](Self::with_advisory) in the order they should be tried.
    pub fn new(config: &PrecomputeConfig) -> Self {
        Self {
            chain: Vec::new(),
            advisory_id: config.advisory_lock_id,
            policy: config.lock_policy,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.chain.push(Arc::new(CacheLock(cache)));
        self
    }

    pub fn with_advisory(mut self, locks: Arc<dyn AdvisoryLocks>) -> Self {
        self.chain.push(Arc::new(AdvisoryLock {
            locks,
            id: self.advisory_id,
        }));
        self
    }

    pub fn acquire(&self, key: &str, ttl: Duration) -> Result<LockGuard> {
        for backend in &self.chain {
            match backend.try_acquire(key, ttl) {
                Ok(true) => {
                    info!(key, backend = backend.name(), "Lock acquired");
                    return Ok(LockGuard {
                        key: key.to_string(),
                        holder: Some(Arc::clone(backend)),
                        outcome: LockOutcome::Acquired(backend.name()),
                    });
                }
                Ok(false) => {
                    warn!(key, backend = backend.name(), "Lock held by another run");
                    return Err(AnalyticsError::LockContended(key.to_string()));
                }
                Err(e) => {
                    warn!(key, backend = backend.name(), error = %e, "Lock backend unreachable, trying next");
                }
            }
        }

        match self.policy {
            LockPolicy::FailOpen => {
                warn!(
                    key,
                    "NO LOCK BACKEND AVAILABLE: proceeding without a lock, concurrent runs are possible"
                );
                Ok(LockGuard::unguarded(key))
            }
            LockPolicy::FailClosed => {
                error!(key, "No lock backend available, refusing to run");
                Err(AnalyticsError::LockUnavailable(key.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewstats_storage::{MemoryCache, MemoryStore};

    const TTL: Duration = Duration::from_secs(60);

    struct DownLocks;

    impl AdvisoryLocks for DownLocks {
        fn try_advisory_lock(&self, _id: i64) -> std::result::Result<bool, BackendError> {
            Err(BackendError::unavailable("advisory", "no database"))
        }

        fn advisory_unlock(&self, _id: i64) -> std::result::Result<(), BackendError> {
            Err(BackendError::unavailable("advisory", "no database"))
        }
    }

    fn config(policy: LockPolicy) -> PrecomputeConfig {
        PrecomputeConfig {
            lock_policy: policy,
            ..Default::default()
        }
    }

    #[test]
    fn test_cache_lock_is_exclusive_and_released_on_drop() {
        let cache = Arc::new(MemoryCache::new());
        let lock = DistributedLock::new(&config(LockPolicy::FailOpen)).with_cache(cache.clone());

        let guard = lock.acquire("job", TTL).unwrap();
        assert_eq!(guard.outcome(), LockOutcome::Acquired("cache"));
        assert!(matches!(
            lock.acquire("job", TTL),
            Err(AnalyticsError::LockContended(_))
        ));

        drop(guard);
        assert!(cache.get("job").unwrap().is_none());
        assert!(lock.acquire("job", TTL).is_ok());
    }

    #[test]
    fn test_unreachable_cache_falls_through_to_advisory() {
        let cache = Arc::new(MemoryCache::new());
        cache.set_offline(true);
        let store = Arc::new(MemoryStore::new());
        let lock = DistributedLock::new(&config(LockPolicy::FailClosed))
            .with_cache(cache)
            .with_advisory(store.clone());

        let guard = lock.acquire("job", TTL).unwrap();
        assert_eq!(guard.outcome(), LockOutcome::Acquired("advisory"));
        assert!(!store.try_advisory_lock(PrecomputeConfig::default().advisory_lock_id).unwrap());

        drop(guard);
        assert!(store.try_advisory_lock(PrecomputeConfig::default().advisory_lock_id).unwrap());
    }

    #[test]
    fn test_exhausted_chain_follows_policy() {
        let cache = Arc::new(MemoryCache::new());
        cache.set_offline(true);

        let open = DistributedLock::new(&config(LockPolicy::FailOpen))
            .with_cache(cache.clone())
            .with_advisory(Arc::new(DownLocks));
        assert_eq!(
            open.acquire("job", TTL).unwrap().outcome(),
            LockOutcome::Unguarded
        );

        let closed = DistributedLock::new(&config(LockPolicy::FailClosed))
            .with_cache(cache)
            .with_advisory(Arc::new(DownLocks));
        assert!(matches!(
            closed.acquire("job", TTL),
            Err(AnalyticsError::LockUnavailable(_))
        ));
    }

    #[test]
    fn test_empty_chain_fails_open_by_default() {
        let lock = DistributedLock::new(&PrecomputeConfig::default());
        assert_eq!(lock.acquire("job", TTL).unwrap().outcome(), LockOutcome::Unguarded);
    }
}
