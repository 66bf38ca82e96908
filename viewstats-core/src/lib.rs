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

//! Viewstats Core
//!
//! Fundamental data structures for blog view analytics: the raw view event,
//! the per-day summary row, the validated filter model and the predicate
//! language every store understands.

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod granularity;
pub mod growth;
pub mod point;
pub mod predicate;
pub mod summary;

pub use config::{
    AnalyticsConfig, BreadthMetric, CacheConfig, CardinalityConfig, FilterLimits, LockPolicy,
    PerformanceConfig, PrecomputeConfig, DEFAULT_TOP_LIMIT,
};
pub use error::{ConfigError, ValidationError};
pub use event::{BlogId, BlogRecord, ViewEvent};
pub use filter::{FilterRequest, FilterSpec, RangeShortcut, TimeWindow};
pub use granularity::Granularity;
pub use growth::{growth_percentages, label_periods, PeriodStats};
pub use point::AnalyticsPoint;
pub use predicate::{Condition, Field, Predicate, Record, Value};
pub use summary::{DailySummary, SummaryId, SummaryKey};
