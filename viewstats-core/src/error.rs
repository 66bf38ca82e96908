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

//! Error types shared by every crate in the workspace.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed or contradictory query input.
///
/// A query that fails validation never reaches an aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid range '{0}'. Must be one of: day, week, month, year")]
    UnknownRange(String),

    #[error("Invalid compare granularity '{0}'. Must be one of: day, week, month, year")]
    UnknownGranularity(String),

    #[error("{field}: cannot be an empty list. Omit the field or provide at least one value")]
    EmptyList { field: &'static str },

    #[error("{field}: {value} is outside the allowed range {min}..={max}")]
    OutOfBounds {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{field}: '{value}' is longer than {max} characters")]
    TooLong {
        field: &'static str,
        value: String,
        max: usize,
    },

    #[error("start_date must not be after end_date")]
    InvertedRange,

    #[error("object_type must be one of: country, user (got '{0}')")]
    UnknownDimension(String),

    #[error("top_type must be one of: blog, user, country (got '{0}')")]
    UnknownTopKind(String),
}

/// Failure to load an [`AnalyticsConfig`](crate::AnalyticsConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
