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

//! Approximate-cardinality backend
//!
//! Sketches are keyed `"{prefix}:hll:{date}:{country|all}:{author|all}"`,
//! one per daily summary key, and expire after a retention period.

use crate::error::BackendError;
use crate::sketches::HyperLogLog;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;
use viewstats_core::{BlogId, CardinalityConfig, SummaryKey};

const BACKEND: &str = "sketch";

/// Store of mergeable distinct-count sketches
pub trait SketchBackend: Send + Sync {
    /// Add blog ids to the sketch at `key`, creating it if needed
    fn add_members(&self, key: &str, members: &[BlogId]) -> Result<(), BackendError>;

    fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), BackendError>;

    /// Estimated size of the union of the sketches at `keys`.
    ///
    /// Missing keys contribute nothing.
    fn merged_cardinality(&self, keys: &[String]) -> Result<u64, BackendError>;
}

/// Sketch key for a summary row
pub fn sketch_key(prefix: &str, key: &SummaryKey) -> String {
    format!("{}:hll:{}", prefix, key)
}

struct StoredSketch {
    sketch: HyperLogLog,
    expires_at: Option<Instant>,
}

impl StoredSketch {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Sketches held in a concurrent map
pub struct MemorySketches {
    sketches: DashMap<String, StoredSketch>,
    precision: u8,
    offline: AtomicBool,
}

impl Default for MemorySketches {
    fn default() -> Self {
        Self::new(crate::sketches::hyperloglog::DEFAULT_PRECISION)
    }
}

impl MemorySketches {
    pub fn new(precision: u8) -> Self {
        Self {
            sketches: DashMap::new(),
            precision,
            offline: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &CardinalityConfig) -> Self {
        Self::new(config.sketch_precision)
    }

    /// Simulate an unreachable sketch server
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live sketches
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sketches.iter().filter(|s| s.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.sketches.get(key).map_or(false, |s| s.is_live(now))
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable(BACKEND, "connection refused"));
        }
        Ok(())
    }
}

impl SketchBackend for MemorySketches {
    fn add_members(&self, key: &str, members: &[BlogId]) -> Result<(), BackendError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut entry = self
            .sketches
            .entry(key.to_string())
            .or_insert_with(|| StoredSketch {
                sketch: HyperLogLog::new(self.precision),
                expires_at: None,
            });
        if !entry.is_live(now) {
            debug!(key, "Discarding expired sketch before update");
            *entry = StoredSketch {
                sketch: HyperLogLog::new(self.precision),
                expires_at: None,
            };
        }
        for member in members {
            entry.sketch.add(member);
        }
        Ok(())
    }

    fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), BackendError> {
        self.ensure_online()?;
        if let Some(mut entry) = self.sketches.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    fn merged_cardinality(&self, keys: &[String]) -> Result<u64, BackendError> {
        self.ensure_online()?;
        let now = Instant::now();
        let mut union = HyperLogLog::new(self.precision);
        for key in keys {
            if let Some(stored) = self.sketches.get(key.as_str()) {
                if stored.is_live(now) {
                    union
                        .merge(&stored.sketch)
                        .map_err(|e| BackendError::operation(BACKEND, e.to_string()))?;
                }
            }
        }
        Ok(union.cardinality())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_sketch_key_format() {
        let key = SummaryKey::new(
            NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            None,
            Some("alice".into()),
        );
        assert_eq!(sketch_key("analytics", &key), "analytics:hll:2025-01-02:all:alice");
    }

    #[test]
    fn test_merged_cardinality_is_union() {
        let sketches = MemorySketches::default();
        sketches.add_members("d1", &[1, 2]).unwrap();
        sketches.add_members("d2", &[1]).unwrap();

        let keys = vec!["d1".to_string(), "d2".to_string(), "missing".to_string()];
        assert_eq!(sketches.merged_cardinality(&keys).unwrap(), 2);
        assert_eq!(sketches.merged_cardinality(&[]).unwrap(), 0);
    }

    #[test]
    fn test_expired_sketches_ignored() {
        let sketches = MemorySketches::default();
        sketches.add_members("d1", &[1, 2, 3]).unwrap();
        sketches.set_expiry("d1", Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert!(!sketches.contains("d1"));
        assert_eq!(sketches.merged_cardinality(&["d1".to_string()]).unwrap(), 0);
    }

    #[test]
    fn test_add_after_expiry_starts_fresh() {
        let sketches = MemorySketches::default();
        sketches.add_members("d1", &[1, 2, 3]).unwrap();
        sketches.set_expiry("d1", Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        sketches.add_members("d1", &[9]).unwrap();
        assert!(sketches.contains("d1"));
        assert_eq!(sketches.merged_cardinality(&["d1".to_string()]).unwrap(), 1);
    }

    #[test]
    fn test_offline_backend_fails() {
        let sketches = MemorySketches::default();
        sketches.set_offline(true);
        assert!(sketches.add_members("d1", &[1]).is_err());
        assert!(sketches.merged_cardinality(&["d1".to_string()]).is_err());
    }
}
