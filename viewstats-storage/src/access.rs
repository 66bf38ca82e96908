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

//! Data-access traits
//!
//! Aggregation is pushed down to the store: callers describe what to filter,
//! what to group by and what to count distinct, and get back one row per
//! group. A relational backend translates an [`AggregateQuery`] into a single
//! `SELECT ... WHERE ... GROUP BY`; [`MemoryStore`](crate::MemoryStore)
//! evaluates it directly.

use crate::error::{BackendError, StorageError};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashMap};
use viewstats_core::{
    BlogId, DailySummary, Field, Granularity, Predicate, Record, SummaryKey, Value,
};

/// Grouping or distinct-count target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Country,
    Author,
    Blog,
    /// Calendar day (UTC)
    Day,
    /// Start of the enclosing period
    Period(Granularity),
}

impl Dimension {
    /// Value of this dimension for `record`
    pub fn extract<R: Record + ?Sized>(&self, record: &R) -> Value {
        match self {
            Dimension::Country => record.value(Field::Country),
            Dimension::Author => record.value(Field::Author),
            Dimension::Blog => record.value(Field::Blog),
            Dimension::Day => date_of(record),
            Dimension::Period(granularity) => match date_of(record).as_date() {
                Some(date) => Value::Date(granularity.truncate(date)),
                None => Value::Null,
            },
        }
    }

    /// Underlying record field, if the dimension maps to one directly
    pub fn field(&self) -> Option<Field> {
        match self {
            Dimension::Country => Some(Field::Country),
            Dimension::Author => Some(Field::Author),
            Dimension::Blog => Some(Field::Blog),
            Dimension::Day => Some(Field::Date),
            Dimension::Period(_) => None,
        }
    }
}

fn date_of<R: Record + ?Sized>(record: &R) -> Value {
    match record.value(Field::Date) {
        Value::Time(t) => Value::Date(t.date_naive()),
        other => other,
    }
}

/// Filtered, grouped count with an optional distinct count
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub filter: Predicate,
    pub group_by: Vec<Dimension>,
    /// Count distinct non-null values of this dimension per group
    pub distinct: Option<Dimension>,
}

impl AggregateQuery {
    pub fn new(filter: Predicate) -> Self {
        Self {
            filter,
            group_by: Vec::new(),
            distinct: None,
        }
    }

    pub fn group_by(mut self, dimension: Dimension) -> Self {
        self.group_by.push(dimension);
        self
    }

    pub fn count_distinct(mut self, dimension: Dimension) -> Self {
        self.distinct = Some(dimension);
        self
    }
}

/// One group of an [`AggregateQuery`] result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    /// Group values, in `group_by` order; null dimensions stay `Value::Null`
    pub key: Vec<Value>,
    pub count: u64,
    /// Zero when the query had no distinct target
    pub distinct: u64,
}

/// Exact set of blogs seen in one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSetRow {
    pub key: Vec<Value>,
    pub members: BTreeSet<BlogId>,
}

/// Read access to raw view events and the blog catalog
pub trait EventStore: Send + Sync {
    /// Grouped counts over events matching `query.filter`, ordered by key
    fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>, StorageError>;

    /// Distinct blog ids per group over events matching `filter`, ordered by key
    fn member_sets(
        &self,
        filter: &Predicate,
        group_by: &[Dimension],
    ) -> Result<Vec<MemberSetRow>, StorageError>;

    /// Earliest and latest timestamp among matching events
    fn time_bounds(
        &self,
        filter: &Predicate,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, StorageError>;

    /// Titles for the given blog ids; unknown ids are absent from the map
    fn blog_titles(&self, ids: &[BlogId]) -> Result<HashMap<BlogId, String>, StorageError>;

    /// Blogs created per period among catalog entries matching `filter`
    fn blog_creations(
        &self,
        filter: &Predicate,
        granularity: Granularity,
    ) -> Result<Vec<(NaiveDate, u64)>, StorageError>;
}

/// Inserts and in-place updates applied as one transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryBatch {
    /// New rows; `id` must be `None`
    pub inserts: Vec<DailySummary>,
    /// Existing rows carrying their stored `id`
    pub updates: Vec<DailySummary>,
}

impl SummaryBatch {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserts.len() + self.updates.len()
    }
}

/// Persisted daily summaries
pub trait SummaryStore: Send + Sync {
    /// Whether any summary row exists at all
    fn has_summaries(&self) -> Result<bool, StorageError>;

    fn get(&self, key: &SummaryKey) -> Result<Option<DailySummary>, StorageError>;

    /// Rows matching `filter`, ordered by key
    fn scan(&self, filter: &Predicate) -> Result<Vec<DailySummary>, StorageError>;

    /// Apply every insert and update, or none of them
    fn commit(&self, batch: SummaryBatch) -> Result<(), StorageError>;
}

/// Process-wide advisory locks identified by a fixed number
pub trait AdvisoryLocks: Send + Sync {
    /// `Ok(false)` when another holder owns the lock
    fn try_advisory_lock(&self, id: i64) -> Result<bool, BackendError>;

    fn advisory_unlock(&self, id: i64) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use viewstats_core::ViewEvent;

    #[test]
    fn test_period_dimension_truncates() {
        // 2025-03-14 is a Friday
        let event = ViewEvent::new(
            Some("US"),
            "alice",
            1,
            Utc.with_ymd_and_hms(2025, 3, 14, 18, 30, 0).unwrap(),
        );
        assert_eq!(
            Dimension::Period(Granularity::Week).extract(&event),
            Value::Date(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
        );
        assert_eq!(
            Dimension::Day.extract(&event),
            Value::Date(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
        );
        assert_eq!(Dimension::Blog.extract(&event), Value::Id(1));
    }

    #[test]
    fn test_query_builder() {
        let query = AggregateQuery::new(Predicate::always())
            .group_by(Dimension::Country)
            .group_by(Dimension::Day)
            .count_distinct(Dimension::Blog);
        assert_eq!(query.group_by, vec![Dimension::Country, Dimension::Day]);
        assert_eq!(query.distinct, Some(Dimension::Blog));
    }
}
