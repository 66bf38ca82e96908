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

//! Period-over-period growth for time series.

use crate::point::AnalyticsPoint;
use chrono::NaiveDate;

/// Aggregated numbers for one time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodStats {
    /// First day of the bucket
    pub period: NaiveDate,
    pub views: u64,
    /// Distinct blogs viewed (or created) in the bucket
    pub breadth: u64,
}

/// Growth of each value over its predecessor, in percent, rounded to 2 decimals.
///
/// The first period has no predecessor and gets `0.0`; growth from a zero
/// predecessor is also `0.0` rather than infinite.
pub fn growth_percentages(views: &[u64]) -> Vec<f64> {
    let mut previous = 0u64;
    views
        .iter()
        .map(|&current| {
            let growth = if previous > 0 {
                (current as f64 - previous as f64) / previous as f64 * 100.0
            } else {
                0.0
            };
            previous = current;
            round2(growth)
        })
        .collect()
}

/// Render ordered buckets as `{x: "YYYY-MM-DD (N blogs)", y: views, z: growth%}`
pub fn label_periods(periods: &[PeriodStats]) -> Vec<AnalyticsPoint> {
    let views: Vec<u64> = periods.iter().map(|p| p.views).collect();
    periods
        .iter()
        .zip(growth_percentages(&views))
        .map(|(p, growth)| {
            AnalyticsPoint::new(
                format!("{} ({} blogs)", p.period.format("%Y-%m-%d"), p.breadth),
                p.views,
                growth,
            )
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
