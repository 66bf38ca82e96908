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

//! Query shapes accepted by the analytics operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use viewstats_core::{Field, ValidationError};
use viewstats_storage::Dimension;

/// Grouping dimension of grouped totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupDimension {
    Country,
    /// Blog author (`user` on the wire)
    Author,
}

impl GroupDimension {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupDimension::Country => "country",
            GroupDimension::Author => "user",
        }
    }

    pub fn field(self) -> Field {
        match self {
            GroupDimension::Country => Field::Country,
            GroupDimension::Author => Field::Author,
        }
    }

    pub fn dimension(self) -> Dimension {
        match self {
            GroupDimension::Country => Dimension::Country,
            GroupDimension::Author => Dimension::Author,
        }
    }
}

impl fmt::Display for GroupDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupDimension {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "country" | "group" => Ok(GroupDimension::Country),
            "user" | "author" => Ok(GroupDimension::Author),
            other => Err(ValidationError::UnknownDimension(other.to_string())),
        }
    }
}

/// Entity ranked by top-N queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopKind {
    /// Ranked by views; secondary metric is distinct countries
    Blog,
    /// Ranked by views; secondary metric is distinct blogs
    Author,
    /// Ranked by views; secondary metric is distinct blogs
    Country,
}

impl TopKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TopKind::Blog => "blog",
            TopKind::Author => "user",
            TopKind::Country => "country",
        }
    }

    /// Grouping dimension and distinct target
    pub fn dimensions(self) -> (Dimension, Dimension) {
        match self {
            TopKind::Blog => (Dimension::Blog, Dimension::Country),
            TopKind::Author => (Dimension::Author, Dimension::Blog),
            TopKind::Country => (Dimension::Country, Dimension::Blog),
        }
    }
}

impl fmt::Display for TopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blog" => Ok(TopKind::Blog),
            "user" | "author" => Ok(TopKind::Author),
            "country" | "group" => Ok(TopKind::Country),
            other => Err(ValidationError::UnknownTopKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!("group".parse::<GroupDimension>().unwrap(), GroupDimension::Country);
        assert_eq!("author".parse::<GroupDimension>().unwrap(), GroupDimension::Author);
        assert_eq!("user".parse::<TopKind>().unwrap(), TopKind::Author);
        assert_eq!("group".parse::<TopKind>().unwrap(), TopKind::Country);
    }

    #[test]
    fn test_unknown_values_rejected() {
        assert_eq!(
            "blog".parse::<GroupDimension>(),
            Err(ValidationError::UnknownDimension("blog".into()))
        );
        assert_eq!(
            "tag".parse::<TopKind>(),
            Err(ValidationError::UnknownTopKind("tag".into()))
        );
    }
}
