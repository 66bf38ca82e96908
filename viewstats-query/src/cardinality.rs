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

//! Distinct-blog counts across days
//!
//! Each daily summary carries the exact set of blogs seen that day. The
//! number of distinct blogs over a range is the size of the union of those
//! sets, never the sum of the per-day counts.
//!
//! [`CardinalityStrategy::Approximate`] reads the union size from merged
//! HyperLogLog sketches instead and falls back to the exact union whenever
//! the sketch backend fails. A zero read successfully from the sketches is
//! a real zero.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};
use viewstats_core::{BlogId, CardinalityConfig, DailySummary};
use viewstats_storage::{sketch_key, BackendError, SketchBackend};

/// Exact union of the per-day member sets
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactUnion;

impl ExactUnion {
    pub fn distinct(&self, rows: &[&DailySummary]) -> u64 {
        let union: BTreeSet<BlogId> = rows
            .iter()
            .flat_map(|row| row.blog_ids().iter().copied())
            .collect();
        union.len() as u64
    }
}

/// Union size estimated from per-key sketches
pub struct ApproximateUnion {
    backend: Arc<dyn SketchBackend>,
    key_prefix: String,
    fallback: ExactUnion,
}

impl ApproximateUnion {
    pub fn new(backend: Arc<dyn SketchBackend>, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
            fallback: ExactUnion,
        }
    }

    fn estimate(&self, rows: &[&DailySummary]) -> Result<u64, BackendError> {
        let keys: Vec<String> = rows
            .iter()
            .map(|row| sketch_key(&self.key_prefix, &row.key))
            .collect();
        self.backend.merged_cardinality(&keys)
    }

    pub fn distinct(&self, group: &str, rows: &[&DailySummary]) -> u64 {
        match self.estimate(rows) {
            Ok(count) => count,
            Err(e) => {
                warn!(group, error = %e, "Sketch merge failed, using exact union");
                self.fallback.distinct(rows)
            }
        }
    }
}

/// How grouped fast queries count distinct blogs
pub enum CardinalityStrategy {
    Exact(ExactUnion),
    Approximate(ApproximateUnion),
}

impl Default for CardinalityStrategy {
    fn default() -> Self {
        CardinalityStrategy::Exact(ExactUnion)
    }
}

impl CardinalityStrategy {
    /// Pick a strategy from configuration.
    ///
    /// Approximate counting needs both the config flag and a backend; with
    /// only the flag set, exact counting is used.
    pub fn from_config(
        config: &CardinalityConfig,
        key_prefix: &str,
        backend: Option<Arc<dyn SketchBackend>>,
    ) -> Self {
        match (config.use_approximate, backend) {
            (true, Some(backend)) => {
                CardinalityStrategy::Approximate(ApproximateUnion::new(backend, key_prefix))
            }
            (true, None) => {
                warn!("Approximate cardinality enabled but no sketch backend configured");
                CardinalityStrategy::default()
            }
            (false, _) => CardinalityStrategy::default(),
        }
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, CardinalityStrategy::Approximate(_))
    }

    /// Distinct blogs across the summaries contributing to `group`
    pub fn distinct_count(&self, group: &str, rows: &[&DailySummary]) -> u64 {
        let count = match self {
            CardinalityStrategy::Exact(exact) => exact.distinct(rows),
            CardinalityStrategy::Approximate(approx) => approx.distinct(group, rows),
        };
        debug!(group, rows = rows.len(), count, "Distinct blog count");
        count
    }
}
