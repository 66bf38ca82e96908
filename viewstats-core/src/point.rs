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

use serde::{Deserialize, Serialize};

/// Row of every analytics response.
///
/// - `x`: grouping key (country code, username, blog title or period label)
/// - `y`: primary metric (distinct blogs, or total views for top/performance)
/// - `z`: secondary metric (total views, distinct count, or growth percent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsPoint {
    pub x: String,
    pub y: u64,
    pub z: f64,
}

impl AnalyticsPoint {
    pub fn new(x: impl Into<String>, y: u64, z: f64) -> Self {
        Self { x: x.into(), y, z }
    }
}
