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

//! Queries answered directly from raw view events
//!
//! Every query is one aggregation pushed down to the [`EventStore`].
//! Events with a null grouping value never form a group.

use crate::error::Result;
use crate::kinds::{GroupDimension, TopKind};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use viewstats_core::{
    label_periods, AnalyticsPoint, BlogId, BreadthMetric, FilterSpec, Granularity, PeriodStats,
    Predicate, Value, DEFAULT_TOP_LIMIT,
};
use viewstats_storage::{AggregateQuery, Dimension, EventStore};

pub struct LiveAggregator {
    events: Arc<dyn EventStore>,
    breadth: BreadthMetric,
    top_limit: usize,
}

impl LiveAggregator {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self {
            events,
            breadth: BreadthMetric::default(),
            top_limit: DEFAULT_TOP_LIMIT,
        }
    }

    pub fn with_breadth(mut self, breadth: BreadthMetric) -> Self {
        self.breadth = breadth;
        self
    }

    /// Clamped to `1..=DEFAULT_TOP_LIMIT`
    pub fn with_top_limit(mut self, top_limit: usize) -> Self {
        self.top_limit = top_limit.clamp(1, DEFAULT_TOP_LIMIT);
        self
    }

    /// `{x: dimension value, y: distinct blogs, z: views}` per group, by views descending
    pub fn grouped_totals(
        &self,
        dimension: GroupDimension,
        filter: &FilterSpec,
    ) -> Result<Vec<AnalyticsPoint>> {
        let query = AggregateQuery::new(
            filter.event_predicate() & Predicate::not_null(dimension.field()),
        )
        .group_by(dimension.dimension())
        .count_distinct(Dimension::Blog);

        let mut points: Vec<AnalyticsPoint> = self
            .events
            .aggregate(&query)?
            .into_iter()
            .map(|row| AnalyticsPoint::new(label(&row.key), row.distinct, row.count as f64))
            .collect();
        points.sort_by(by_z_desc);
        debug!(dimension = %dimension, groups = points.len(), "Live grouped totals");
        Ok(points)
    }

    /// Top entities by views: `{x: label, y: views, z: secondary distinct count}`
    pub fn top(&self, kind: TopKind, filter: &FilterSpec) -> Result<Vec<AnalyticsPoint>> {
        let (group, distinct) = kind.dimensions();
        let mut predicate = filter.event_predicate();
        if let Some(field) = group.field() {
            predicate = predicate & Predicate::not_null(field);
        }
        let rows = self
            .events
            .aggregate(&AggregateQuery::new(predicate).group_by(group).count_distinct(distinct))?;

        let titles = if kind == TopKind::Blog {
            let ids: Vec<BlogId> = rows
                .iter()
                .filter_map(|row| match row.key.first() {
                    Some(Value::Id(id)) => Some(*id),
                    _ => None,
                })
                .collect();
            self.events.blog_titles(&ids)?
        } else {
            Default::default()
        };

        let mut points: Vec<AnalyticsPoint> = rows
            .into_iter()
            .map(|row| {
                let x = match row.key.first() {
                    Some(Value::Id(id)) => titles
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| id.to_string()),
                    _ => label(&row.key),
                };
                AnalyticsPoint::new(x, row.count, row.distinct as f64)
            })
            .collect();
        points.sort_by(by_y_desc);
        points.truncate(self.top_limit);
        Ok(points)
    }

    /// Views and breadth per period with period-over-period growth.
    ///
    /// Granularity is forced by the filter's `compare` or derived from the
    /// span of matching events. Empty when nothing matches.
    pub fn performance(&self, filter: &FilterSpec) -> Result<Vec<AnalyticsPoint>> {
        let predicate = filter.event_predicate();
        let Some((first, last)) = self.events.time_bounds(&predicate)? else {
            return Ok(Vec::new());
        };
        let granularity = filter
            .compare()
            .unwrap_or_else(|| Granularity::for_span(first, last));

        let mut periods: BTreeMap<_, PeriodStats> = BTreeMap::new();
        let views = self.events.aggregate(
            &AggregateQuery::new(predicate)
                .group_by(Dimension::Period(granularity))
                .count_distinct(Dimension::Blog),
        )?;
        for row in views {
            if let Some(period) = row.key.first().and_then(Value::as_date) {
                let stats = periods.entry(period).or_insert(PeriodStats {
                    period,
                    views: 0,
                    breadth: 0,
                });
                stats.views = row.count;
                if self.breadth == BreadthMetric::Viewed {
                    stats.breadth = row.distinct;
                }
            }
        }

        if self.breadth == BreadthMetric::Created {
            for (period, created) in self
                .events
                .blog_creations(&filter.creation_predicate(), granularity)?
            {
                periods
                    .entry(period)
                    .or_insert(PeriodStats {
                        period,
                        views: 0,
                        breadth: 0,
                    })
                    .breadth = created;
            }
        }

        debug!(%granularity, periods = periods.len(), "Live performance series");
        let ordered: Vec<PeriodStats> = periods.into_values().collect();
        Ok(label_periods(&ordered))
    }
}

fn label(key: &[Value]) -> String {
    key.first().map(Value::to_string).unwrap_or_default()
}

/// Descending `z`, ties by ascending `x`
pub(crate) fn by_z_desc(a: &AnalyticsPoint, b: &AnalyticsPoint) -> Ordering {
    b.z.total_cmp(&a.z).then_with(|| a.x.cmp(&b.x))
}

/// Descending `y`, ties by ascending `x`
fn by_y_desc(a: &AnalyticsPoint, b: &AnalyticsPoint) -> Ordering {
    b.y.cmp(&a.y).then_with(|| a.x.cmp(&b.x))
}
