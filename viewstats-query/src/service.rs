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

//! Public analytics operations
//!
//! Each operation validates its input first, then serves through the
//! [`ResultCache`]:
//!
//! - [`AnalyticsService::grouped_analytics`]: grouped totals from summaries,
//!   or from raw events when a blog filter is present
//! - [`AnalyticsService::top_analytics`]: top entities by views
//! - [`AnalyticsService::performance_analytics`]: time series with growth

use crate::cache::{Computed, ResultCache};
use crate::cardinality::CardinalityStrategy;
use crate::error::Result;
use crate::fast::{FastAggregator, FastResult};
use crate::kinds::{GroupDimension, TopKind};
use crate::live::LiveAggregator;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use viewstats_core::{AnalyticsConfig, AnalyticsPoint, FilterLimits, FilterRequest, FilterSpec};
use viewstats_storage::{CacheBackend, EventStore, SketchBackend, SummaryStore};

pub struct AnalyticsServiceBuilder {
    config: AnalyticsConfig,
    events: Arc<dyn EventStore>,
    summaries: Arc<dyn SummaryStore>,
    cache: Option<Arc<dyn CacheBackend>>,
    sketches: Option<Arc<dyn SketchBackend>>,
}

impl AnalyticsServiceBuilder {
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn sketches(mut self, sketches: Arc<dyn SketchBackend>) -> Self {
        self.sketches = Some(sketches);
        self
    }

    pub fn build(self) -> AnalyticsService {
        let config = self.config;
        let cache = match self.cache {
            Some(backend) => ResultCache::new(backend, &config.cache),
            None => ResultCache::disabled(&config.cache),
        };
        let cardinality = CardinalityStrategy::from_config(
            &config.cardinality,
            &config.cache.key_prefix,
            self.sketches,
        );
        AnalyticsService {
            live: LiveAggregator::new(self.events)
                .with_breadth(config.performance.breadth_metric)
                .with_top_limit(config.top_limit),
            fast: FastAggregator::new(self.summaries, cardinality),
            cache,
            limits: config.filters,
        }
    }
}

pub struct AnalyticsService {
    live: LiveAggregator,
    fast: FastAggregator,
    cache: ResultCache,
    limits: FilterLimits,
}

impl AnalyticsService {
    pub fn builder(
        config: AnalyticsConfig,
        events: Arc<dyn EventStore>,
        summaries: Arc<dyn SummaryStore>,
    ) -> AnalyticsServiceBuilder {
        AnalyticsServiceBuilder {
            config,
            events,
            summaries,
            cache: None,
            sketches: None,
        }
    }

    /// Validate `request`, expanding range shortcuts relative to `now`
    pub fn validate_at(&self, request: &FilterRequest, now: DateTime<Utc>) -> Result<FilterSpec> {
        Ok(FilterSpec::from_request(request, now, &self.limits)?)
    }

    pub fn validate(&self, request: &FilterRequest) -> Result<FilterSpec> {
        self.validate_at(request, Utc::now())
    }

    /// Grouped totals by `dimension` (`country`/`group` or `user`/`author`)
    pub fn grouped_analytics(
        &self,
        dimension: &str,
        request: &FilterRequest,
    ) -> Result<Vec<AnalyticsPoint>> {
        let dimension: GroupDimension = dimension.parse()?;
        let filter = self.validate(request)?;
        self.grouped(dimension, &filter)
    }

    /// Top entities of `kind` (`blog`, `user`/`author`, `country`/`group`)
    pub fn top_analytics(&self, kind: &str, request: &FilterRequest) -> Result<Vec<AnalyticsPoint>> {
        let kind: TopKind = kind.parse()?;
        let filter = self.validate(request)?;
        self.top(kind, &filter)
    }

    pub fn performance_analytics(&self, request: &FilterRequest) -> Result<Vec<AnalyticsPoint>> {
        let filter = self.validate(request)?;
        self.performance(&filter)
    }

    pub fn grouped(
        &self,
        dimension: GroupDimension,
        filter: &FilterSpec,
    ) -> Result<Vec<AnalyticsPoint>> {
        let key = self
            .cache
            .key("grouped", json!({ "dimension": dimension.as_str() }), filter);
        self.cache.get_or_compute(&key, || {
            if filter.blog_id().is_some() {
                debug!(dimension = %dimension, "Blog filter present, using live path");
                return Ok(Computed::cacheable(self.live.grouped_totals(dimension, filter)?));
            }
            Ok(match self.fast.grouped_totals(dimension, filter)? {
                FastResult::ColdStart => Computed::transient(Vec::new()),
                FastResult::Ready(points) => Computed::cacheable(points),
            })
        })
    }

    pub fn top(&self, kind: TopKind, filter: &FilterSpec) -> Result<Vec<AnalyticsPoint>> {
        let key = self
            .cache
            .key("top", json!({ "top_type": kind.as_str() }), filter);
        self.cache
            .get_or_compute(&key, || Ok(Computed::cacheable(self.live.top(kind, filter)?)))
    }

    pub fn performance(&self, filter: &FilterSpec) -> Result<Vec<AnalyticsPoint>> {
        let key = self.cache.key("performance", json!({}), filter);
        self.cache
            .get_or_compute(&key, || Ok(Computed::cacheable(self.live.performance(filter)?)))
    }
}
