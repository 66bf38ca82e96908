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

//! Configuration for analytics behavior
//!
//! Every section has sensible defaults so an empty TOML document (or no file
//! at all) yields a working setup:
//! - Cache: 15 minute TTL under the `analytics` key prefix
//! - Filters: years 2000-2100, country codes up to 5 characters
//! - Cardinality: exact union (approximate sketches are opt-in)
//! - Precompute: cache lock first, advisory lock second, fail open

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Maximum number of rows returned by top-N queries
pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Default TTL for cached query results (15 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 15 * 60;

/// Default retention for per-day cardinality sketches (90 days)
pub const DEFAULT_SKETCH_RETENTION_SECS: u64 = 90 * 24 * 60 * 60;

/// Fixed identifier for the database advisory lock guarding precompute runs
pub const DEFAULT_ADVISORY_LOCK_ID: i64 = 1_234_567_890;

/// Top-level analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub cache: CacheConfig,
    pub filters: FilterLimits,
    pub cardinality: CardinalityConfig,
    pub performance: PerformanceConfig,
    pub precompute: PrecomputeConfig,
    /// Row limit for top-N queries, at most [`DEFAULT_TOP_LIMIT`]
    pub top_limit: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            filters: FilterLimits::default(),
            cardinality: CardinalityConfig::default(),
            performance: PerformanceConfig::default(),
            precompute: PrecomputeConfig::default(),
            top_limit: DEFAULT_TOP_LIMIT,
        }
    }
}

impl AnalyticsConfig {
    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file on disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "Loaded analytics config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filters.year_min > self.filters.year_max {
            return Err(ConfigError::Invalid(format!(
                "filters.year_min ({}) is greater than filters.year_max ({})",
                self.filters.year_min, self.filters.year_max
            )));
        }
        if !(1..=DEFAULT_TOP_LIMIT).contains(&self.top_limit) {
            return Err(ConfigError::Invalid(format!(
                "top_limit must be 1-{DEFAULT_TOP_LIMIT}, got {}",
                self.top_limit
            )));
        }
        if !(4..=18).contains(&self.cardinality.sketch_precision) {
            return Err(ConfigError::Invalid(format!(
                "cardinality.sketch_precision must be 4-18, got {}",
                self.cardinality.sketch_precision
            )));
        }
        Ok(())
    }
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub key_prefix: String,
    /// Capacity of the in-process cache backend
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            key_prefix: "analytics".to_string(),
            max_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Bounds applied while validating filter input
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterLimits {
    pub year_min: i32,
    pub year_max: i32,
    pub group_code_max_len: usize,
}

impl Default for FilterLimits {
    fn default() -> Self {
        Self {
            year_min: 2000,
            year_max: 2100,
            group_code_max_len: 5,
        }
    }
}

/// Distinct-count strategy selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityConfig {
    /// Use merged HyperLogLog sketches instead of exact set unions
    pub use_approximate: bool,
    pub sketch_retention_secs: u64,
    pub sketch_precision: u8,
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self {
            use_approximate: false,
            sketch_retention_secs: DEFAULT_SKETCH_RETENTION_SECS,
            sketch_precision: 14,
        }
    }
}

impl CardinalityConfig {
    pub fn sketch_retention(&self) -> Duration {
        Duration::from_secs(self.sketch_retention_secs)
    }
}

/// Which distinct-blog count labels each performance bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadthMetric {
    /// Distinct blogs viewed during the period
    #[default]
    Viewed,
    /// Blogs created during the period
    Created,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub breadth_metric: BreadthMetric,
}

/// Behavior when no lock backend can be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Proceed without mutual exclusion after a warning
    #[default]
    FailOpen,
    /// Refuse to run
    FailClosed,
}

/// Pre-aggregation job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecomputeConfig {
    pub lock_key: String,
    pub lock_ttl_secs: u64,
    pub advisory_lock_id: i64,
    pub lock_policy: LockPolicy,
}

impl Default for PrecomputeConfig {
    fn default() -> Self {
        Self {
            lock_key: "precalculate_stats_lock".to_string(),
            lock_ttl_secs: 60 * 60,
            advisory_lock_id: DEFAULT_ADVISORY_LOCK_ID,
            lock_policy: LockPolicy::FailOpen,
        }
    }
}

impl PrecomputeConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.cache.ttl_secs, 900);
        assert_eq!(config.cache.key_prefix, "analytics");
        assert_eq!(config.filters.year_min, 2000);
        assert_eq!(config.filters.year_max, 2100);
        assert!(!config.cardinality.use_approximate);
        assert_eq!(config.performance.breadth_metric, BreadthMetric::Viewed);
        assert_eq!(config.precompute.lock_policy, LockPolicy::FailOpen);
        assert_eq!(config.top_limit, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AnalyticsConfig::from_toml_str(
            r#"
            [cardinality]
            use_approximate = true

            [performance]
            breadth_metric = "created"

            [precompute]
            lock_policy = "fail_closed"
            "#,
        )
        .unwrap();

        assert!(config.cardinality.use_approximate);
        assert_eq!(config.cardinality.sketch_precision, 14);
        assert_eq!(config.performance.breadth_metric, BreadthMetric::Created);
        assert_eq!(config.precompute.lock_policy, LockPolicy::FailClosed);
        assert_eq!(config.precompute.lock_key, "precalculate_stats_lock");
        assert_eq!(config.cache.ttl_secs, 900);
    }

    #[test]
    fn test_inverted_year_bounds_rejected() {
        let err = AnalyticsConfig::from_toml_str(
            r#"
            [filters]
            year_min = 2050
            year_max = 2000
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_top_limit_bounded() {
        for raw in ["top_limit = 0", "top_limit = 11", "top_limit = 25"] {
            let err = AnalyticsConfig::from_toml_str(raw).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{raw}");
        }
        assert_eq!(AnalyticsConfig::from_toml_str("top_limit = 10").unwrap().top_limit, 10);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "top_limit = 5\n[cache]\nttl_secs = 60").unwrap();

        let config = AnalyticsConfig::load(file.path()).unwrap();
        assert_eq!(config.top_limit, 5);
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AnalyticsConfig::load("/nonexistent/viewstats.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
