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

//! Logging setup and precompute run metrics.

use crate::precompute::PrecomputeReport;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Instrumentation scope for every viewstats instrument
pub const METER_NAME: &str = "viewstats";

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `default_directive`
/// when the variable is unset.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// Instruments recorded once per committed precompute run
#[derive(Clone)]
pub struct PrecomputeMetrics {
    pub duration_ms: Histogram<f64>,
    pub created: Counter<u64>,
    pub updated: Counter<u64>,
}

impl PrecomputeMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            duration_ms: meter
                .f64_histogram("precalc.duration_ms")
                .with_description("Precompute run duration in milliseconds")
                .init(),
            created: meter
                .u64_counter("precalc.created")
                .with_description("Daily summaries inserted")
                .init(),
            updated: meter
                .u64_counter("precalc.updated")
                .with_description("Daily summaries overwritten in place")
                .init(),
        }
    }

    /// Instruments on the global meter provider (no-op until one is installed)
    pub fn global() -> Self {
        Self::new(&global::meter(METER_NAME))
    }

    pub fn record(&self, report: &PrecomputeReport) {
        self.duration_ms.record(report.elapsed.as_secs_f64() * 1000.0, &[]);
        self.created.add(report.created as u64, &[]);
        self.updated.add(report.updated as u64, &[]);
    }
}
