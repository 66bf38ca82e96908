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

//! Grouped totals from pre-computed daily summaries

use crate::cardinality::CardinalityStrategy;
use crate::error::Result;
use crate::kinds::GroupDimension;
use crate::live::by_z_desc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use viewstats_core::{AnalyticsPoint, DailySummary, FilterSpec, Record};
use viewstats_storage::SummaryStore;

/// Answer of the summary path
#[derive(Debug, Clone, PartialEq)]
pub enum FastResult {
    /// No summaries exist yet; the precompute job has never run
    ColdStart,
    Ready(Vec<AnalyticsPoint>),
}

impl FastResult {
    pub fn is_cold_start(&self) -> bool {
        matches!(self, FastResult::ColdStart)
    }

    pub fn into_points(self) -> Vec<AnalyticsPoint> {
        match self {
            FastResult::ColdStart => Vec::new(),
            FastResult::Ready(points) => points,
        }
    }
}

pub struct FastAggregator {
    summaries: Arc<dyn SummaryStore>,
    cardinality: CardinalityStrategy,
}

impl FastAggregator {
    pub fn new(summaries: Arc<dyn SummaryStore>, cardinality: CardinalityStrategy) -> Self {
        Self {
            summaries,
            cardinality,
        }
    }

    pub fn cardinality(&self) -> &CardinalityStrategy {
        &self.cardinality
    }

    /// `{x: dimension value, y: distinct blogs over the range, z: views}`, by views descending.
    ///
    /// Any blog filter on `filter` is not applied: summaries carry no blog
    /// dimension.
    pub fn grouped_totals(
        &self,
        dimension: GroupDimension,
        filter: &FilterSpec,
    ) -> Result<FastResult> {
        if !self.summaries.has_summaries()? {
            warn!(
                dimension = %dimension,
                "No pre-computed summaries found, run the precompute job first"
            );
            return Ok(FastResult::ColdStart);
        }

        let rows = self.summaries.scan(&filter.summary_predicate())?;
        let mut groups: BTreeMap<String, Vec<&DailySummary>> = BTreeMap::new();
        for row in &rows {
            if let Some(value) = row.value(dimension.field()).as_text() {
                groups.entry(value.to_string()).or_default().push(row);
            }
        }

        let mut points: Vec<AnalyticsPoint> = groups
            .into_iter()
            .map(|(group, members)| {
                let views: u64 = members.iter().map(|s| s.total_views).sum();
                let distinct = self.cardinality.distinct_count(&group, &members);
                AnalyticsPoint::new(group, distinct, views as f64)
            })
            .collect();
        points.sort_by(by_z_desc);

        debug!(
            dimension = %dimension,
            rows = rows.len(),
            groups = points.len(),
            approximate = self.cardinality.is_approximate(),
            "Fast grouped totals"
        );
        Ok(FastResult::Ready(points))
    }
}
