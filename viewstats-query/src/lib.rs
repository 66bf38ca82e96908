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

//! Viewstats Query
//!
//! Query paths over view events and daily summaries:
//!
//! - [`LiveAggregator`]: grouped totals, top-N and performance series straight from raw events
//! - [`FastAggregator`]: grouped totals from pre-computed daily summaries
//! - [`CardinalityStrategy`]: exact or sketch-based distinct counts across days
//! - [`PrecomputeJob`]: builds the daily summaries under a [`DistributedLock`]
//! - [`ResultCache`]: TTL cache keyed by endpoint and normalized filters
//! - [`AnalyticsService`]: the three public analytics operations

pub mod cache;
pub mod cardinality;
pub mod error;
pub mod fast;
pub mod kinds;
pub mod live;
pub mod lock;
pub mod precompute;
pub mod service;
pub mod telemetry;

pub use cache::{Computed, ResultCache};
pub use cardinality::CardinalityStrategy;
pub use error::{AnalyticsError, Result};
pub use fast::{FastAggregator, FastResult};
pub use kinds::{GroupDimension, TopKind};
pub use live::LiveAggregator;
pub use lock::{DistributedLock, LockGuard, LockOutcome};
pub use precompute::{PrecomputeJob, PrecomputeOptions, PrecomputeReport};
pub use service::{AnalyticsService, AnalyticsServiceBuilder};
pub use telemetry::{init_tracing, PrecomputeMetrics, METER_NAME};
