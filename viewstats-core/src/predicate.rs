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

//! Declarative filter predicates
//!
//! Filters are built as a tree of `AND` / `OR` / `NOT` nodes over simple
//! field conditions instead of chains of conditional query calls. Stores
//! evaluate the tree against anything implementing [`Record`]; a relational
//! backend would translate the same tree into a `WHERE` clause.
//!
//! ```rust
//! use viewstats_core::{Field, Predicate, Value};
//!
//! let filter = Predicate::in_list(Field::Country, ["US", "UK"])
//!     & !Predicate::eq(Field::Author, "spam-bot");
//! ```
//!
//! Comparisons against a null field never match, as in SQL. Negation is
//! plain boolean negation, so `!in_list(Country, ..)` keeps rows without a
//! country.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Addressable attribute of a stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    /// Event timestamp (blog creation time for blog records)
    Timestamp,
    /// Calendar day of the row (UTC)
    Date,
    /// Country code (summary dimension 1)
    Country,
    /// Author username (summary dimension 2)
    Author,
    Blog,
}

/// Field value as seen by predicates and group keys
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Text(String),
    Id(u64),
    Date(NaiveDate),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Time(t) => Some(t.date_naive()),
            _ => None,
        }
    }

    /// Ordering between values of the same kind; `None` otherwise
    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Id(a), Value::Id(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn year(&self) -> Option<i32> {
        match self {
            Value::Date(d) => Some(d.year()),
            Value::Time(t) => Some(t.year()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Id(id) => write!(f, "{}", id),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Option<&str>> for Value {
    fn from(s: Option<&str>) -> Self {
        s.map_or(Value::Null, Value::from)
    }
}

impl From<u64> for Value {
    fn from(id: u64) -> Self {
        Value::Id(id)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

/// Anything a predicate can be evaluated against
pub trait Record {
    fn value(&self, field: Field) -> Value;
}

/// Leaf condition on a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Eq(Field, Value),
    In(Field, Vec<Value>),
    AtLeast(Field, Value),
    AtMost(Field, Value),
    InYear(Field, i32),
    IsNull(Field),
}

impl Condition {
    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        match self {
            Condition::IsNull(field) => record.value(*field).is_null(),
            Condition::Eq(field, expected) => {
                record.value(*field).compare(expected) == Some(Ordering::Equal)
            }
            Condition::In(field, options) => {
                let actual = record.value(*field);
                options
                    .iter()
                    .any(|o| actual.compare(o) == Some(Ordering::Equal))
            }
            Condition::AtLeast(field, bound) => matches!(
                record.value(*field).compare(bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Condition::AtMost(field, bound) => matches!(
                record.value(*field).compare(bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Condition::InYear(field, year) => record.value(*field).year() == Some(*year),
        }
    }
}

/// Composable boolean filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Conjunction; the empty conjunction matches everything
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    Leaf(Condition),
}

impl Default for Predicate {
    fn default() -> Self {
        Self::always()
    }
}

impl Predicate {
    pub fn always() -> Self {
        Predicate::All(Vec::new())
    }

    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Predicate::Leaf(Condition::Eq(field, value.into()))
    }

    pub fn in_list<I, V>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::Leaf(Condition::In(
            field,
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn at_least(field: Field, value: impl Into<Value>) -> Self {
        Predicate::Leaf(Condition::AtLeast(field, value.into()))
    }

    pub fn at_most(field: Field, value: impl Into<Value>) -> Self {
        Predicate::Leaf(Condition::AtMost(field, value.into()))
    }

    pub fn in_year(field: Field, year: i32) -> Self {
        Predicate::Leaf(Condition::InYear(field, year))
    }

    pub fn is_null(field: Field) -> Self {
        Predicate::Leaf(Condition::IsNull(field))
    }

    pub fn not_null(field: Field) -> Self {
        !Predicate::is_null(field)
    }

    /// Conjoin, flattening nested `All` nodes
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All(mut left), Predicate::All(right)) => {
                left.extend(right);
                Predicate::All(left)
            }
            (Predicate::All(mut left), right) => {
                left.push(right);
                Predicate::All(left)
            }
            (left, Predicate::All(mut right)) => {
                right.insert(0, left);
                Predicate::All(right)
            }
            (left, right) => Predicate::All(vec![left, right]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Any(mut left), Predicate::Any(right)) => {
                left.extend(right);
                Predicate::Any(left)
            }
            (Predicate::Any(mut left), right) => {
                left.push(right);
                Predicate::Any(left)
            }
            (left, right) => Predicate::Any(vec![left, right]),
        }
    }

    /// True when the predicate matches every record
    pub fn is_trivial(&self) -> bool {
        matches!(self, Predicate::All(children) if children.iter().all(Predicate::is_trivial))
    }

    pub fn matches<R: Record + ?Sized>(&self, record: &R) -> bool {
        match self {
            Predicate::All(children) => children.iter().all(|p| p.matches(record)),
            Predicate::Any(children) => children.iter().any(|p| p.matches(record)),
            Predicate::Not(inner) => !inner.matches(record),
            Predicate::Leaf(condition) => condition.matches(record),
        }
    }
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        self.and(rhs)
    }
}

impl BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        self.or(rhs)
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }
}
