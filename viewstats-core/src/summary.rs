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

//! Pre-aggregated daily summaries
//!
//! One row per `(date, country, author)` instead of one row per view. A year
//! of traffic collapses to a few thousand rows, and because each row keeps the
//! exact set of blogs seen that day, distinct-blog counts over any date range
//! can be re-derived by set union without touching the raw events.

use crate::event::BlogId;
use crate::predicate::{Field, Record, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Row identifier assigned by the summary store on insert
pub type SummaryId = u64;

/// Unique key of a summary row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SummaryKey {
    pub date: NaiveDate,
    /// Dimension 1 (country code)
    pub country: Option<String>,
    /// Dimension 2 (author username)
    pub author: Option<String>,
}

impl SummaryKey {
    pub fn new(date: NaiveDate, country: Option<String>, author: Option<String>) -> Self {
        Self {
            date,
            country,
            author,
        }
    }
}

impl fmt::Display for SummaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.date.format("%Y-%m-%d"),
            self.country.as_deref().unwrap_or("all"),
            self.author.as_deref().unwrap_or("all")
        )
    }
}

/// Pre-aggregated views for one day / country / author combination.
///
/// `distinct_blogs` is always `blog_ids.len()`; the two are only ever set
/// together through [`DailySummary::new`] and [`DailySummary::overwrite`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    /// `None` until the row has been persisted
    pub id: Option<SummaryId>,
    pub key: SummaryKey,
    pub total_views: u64,
    distinct_blogs: u64,
    blog_ids: BTreeSet<BlogId>,
}

impl DailySummary {
    pub fn new(key: SummaryKey, total_views: u64, blog_ids: BTreeSet<BlogId>) -> Self {
        Self {
            id: None,
            key,
            total_views,
            distinct_blogs: blog_ids.len() as u64,
            blog_ids,
        }
    }

    /// Replace counts and member set in place, keeping the row identity
    pub fn overwrite(&mut self, total_views: u64, blog_ids: BTreeSet<BlogId>) {
        self.total_views = total_views;
        self.distinct_blogs = blog_ids.len() as u64;
        self.blog_ids = blog_ids;
    }

    pub fn date(&self) -> NaiveDate {
        self.key.date
    }

    /// Distinct blogs viewed on this single day
    pub fn distinct_blogs(&self) -> u64 {
        self.distinct_blogs
    }

    pub fn blog_ids(&self) -> &BTreeSet<BlogId> {
        &self.blog_ids
    }
}

impl Record for DailySummary {
    fn value(&self, field: Field) -> Value {
        match field {
            Field::Timestamp | Field::Date => Value::Date(self.key.date),
            Field::Country => Value::from(self.key.country.as_deref()),
            Field::Author => Value::from(self.key.author.as_deref()),
            // Summaries carry no blog dimension
            Field::Blog => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SummaryKey {
        SummaryKey::new(
            NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            Some("US".into()),
            None,
        )
    }

    #[test]
    fn test_distinct_count_tracks_member_set() {
        let mut summary = DailySummary::new(key(), 5, [1, 2, 2, 3].into_iter().collect());
        assert_eq!(summary.distinct_blogs(), 3);

        summary.overwrite(9, [4].into_iter().collect());
        assert_eq!(summary.total_views, 9);
        assert_eq!(summary.distinct_blogs(), 1);
        assert_eq!(summary.blog_ids().len(), 1);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "2025-01-02:US:all");
    }

    #[test]
    fn test_summary_has_no_blog_dimension() {
        let summary = DailySummary::new(key(), 1, [1].into_iter().collect());
        assert_eq!(summary.value(Field::Blog), Value::Null);
        assert_eq!(summary.value(Field::Author), Value::Null);
        assert_eq!(summary.value(Field::Country), Value::Text("US".into()));
    }
}
