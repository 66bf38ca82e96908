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

//! Query filters
//!
//! [`FilterRequest`] is the loose shape a transport layer deserializes;
//! [`FilterSpec`] is the validated, normalized form every aggregator takes.
//! Aggregators never re-validate: they only ask the filter for the predicate
//! matching their table.
//!
//! Normalization rules:
//! - a `range` shortcut is expanded to `[now - days, now]` and replaces any
//!   explicit `start_date` / `end_date`
//! - `year` wins over any start/end window
//! - country lists are sorted and de-duplicated

use crate::config::FilterLimits;
use crate::error::ValidationError;
use crate::event::BlogId;
use crate::granularity::Granularity;
use crate::predicate::{Field, Predicate, Value};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// Raw filter parameters as received from a client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRequest {
    /// Quick date range: day, week, month or year
    pub range: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub year: Option<i64>,
    /// Include countries (matches ANY)
    pub country_codes: Option<Vec<String>>,
    /// Exclude countries (excludes ALL)
    pub exclude_country_codes: Option<Vec<String>>,
    pub author_username: Option<String>,
    pub blog_id: Option<i64>,
    /// Forced granularity for the performance series
    pub compare: Option<String>,
}

/// Named relative date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeShortcut {
    Day,
    Week,
    Month,
    Year,
}

impl RangeShortcut {
    pub fn days(self) -> i64 {
        match self {
            RangeShortcut::Day => 1,
            RangeShortcut::Week => 7,
            RangeShortcut::Month => 30,
            RangeShortcut::Year => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RangeShortcut::Day => "day",
            RangeShortcut::Week => "week",
            RangeShortcut::Month => "month",
            RangeShortcut::Year => "year",
        }
    }
}

impl fmt::Display for RangeShortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeShortcut {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(RangeShortcut::Day),
            "week" => Ok(RangeShortcut::Week),
            "month" => Ok(RangeShortcut::Month),
            "year" => Ok(RangeShortcut::Year),
            other => Err(ValidationError::UnknownRange(other.to_string())),
        }
    }
}

/// Time restriction of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    /// Calendar year; takes precedence over any start/end
    Year(i32),
    /// Inclusive bounds, either side optional
    Span {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        TimeWindow::Span {
            start: None,
            end: None,
        }
    }

    /// Predicate on `field`. Summary dates compare against the calendar day
    /// of each bound.
    fn predicate(&self, field: Field) -> Predicate {
        match *self {
            TimeWindow::Year(year) => Predicate::in_year(field, year),
            TimeWindow::Span { start, end } => {
                let mut p = Predicate::always();
                if let Some(start) = start {
                    p = p & Predicate::at_least(field, bound(field, start));
                }
                if let Some(end) = end {
                    p = p & Predicate::at_most(field, bound(field, end));
                }
                p
            }
        }
    }
}

fn bound(field: Field, at: DateTime<Utc>) -> Value {
    match field {
        Field::Date => Value::Date(at.date_naive()),
        _ => Value::Time(at),
    }
}

/// Validated, normalized filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    range: Option<RangeShortcut>,
    window: TimeWindow,
    country_codes: Option<Vec<String>>,
    exclude_country_codes: Option<Vec<String>>,
    author: Option<String>,
    blog_id: Option<BlogId>,
    compare: Option<Granularity>,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self::unfiltered()
    }
}

impl FilterSpec {
    /// Filter matching every event
    pub fn unfiltered() -> Self {
        Self {
            range: None,
            window: TimeWindow::unbounded(),
            country_codes: None,
            exclude_country_codes: None,
            author: None,
            blog_id: None,
            compare: None,
        }
    }

    /// Validate a request against `limits`, expanding range shortcuts relative to `now`
    pub fn from_request(
        request: &FilterRequest,
        now: DateTime<Utc>,
        limits: &FilterLimits,
    ) -> Result<Self, ValidationError> {
        let country_codes =
            normalize_codes("country_codes", request.country_codes.as_deref(), limits)?;
        let exclude_country_codes = normalize_codes(
            "exclude_country_codes",
            request.exclude_country_codes.as_deref(),
            limits,
        )?;

        let range = request
            .range
            .as_deref()
            .map(RangeShortcut::from_str)
            .transpose()?;

        let year = match request.year {
            Some(year) => {
                check_bounds(
                    "year",
                    year,
                    i64::from(limits.year_min),
                    i64::from(limits.year_max),
                )?;
                // Bounds come from i32 limits, so the value fits
                Some(year as i32)
            }
            None => None,
        };

        let blog_id = match request.blog_id {
            Some(id) => {
                check_bounds("blog_id", id, 1, i64::MAX)?;
                Some(id as BlogId)
            }
            None => None,
        };

        let compare = request
            .compare
            .as_deref()
            .map(Granularity::from_str)
            .transpose()?;

        // A year replaces the start/end window; a shortcut overrides explicit
        // dates rather than merging with them
        let window = match year {
            Some(year) => TimeWindow::Year(year),
            None => {
                let (start, end) = match range {
                    Some(shortcut) => (Some(now - Duration::days(shortcut.days())), Some(now)),
                    None => (request.start_date, request.end_date),
                };
                if let (Some(start), Some(end)) = (start, end) {
                    if start > end {
                        return Err(ValidationError::InvertedRange);
                    }
                }
                TimeWindow::Span { start, end }
            }
        };

        Ok(Self {
            range,
            window,
            country_codes,
            exclude_country_codes,
            author: request.author_username.clone(),
            blog_id,
            compare,
        })
    }

    pub fn range(&self) -> Option<RangeShortcut> {
        self.range
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn country_codes(&self) -> Option<&[String]> {
        self.country_codes.as_deref()
    }

    pub fn exclude_country_codes(&self) -> Option<&[String]> {
        self.exclude_country_codes.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn blog_id(&self) -> Option<BlogId> {
        self.blog_id
    }

    pub fn compare(&self) -> Option<Granularity> {
        self.compare
    }

    /// Predicate over raw view events (event timestamp)
    pub fn event_predicate(&self) -> Predicate {
        let mut p = self.window.predicate(Field::Timestamp) & self.dimension_predicate();
        if let Some(blog_id) = self.blog_id {
            p = p & Predicate::eq(Field::Blog, blog_id);
        }
        p
    }

    /// Predicate over daily summaries (summary date and dimensions).
    ///
    /// Summaries have no blog dimension, so a blog filter cannot apply here.
    pub fn summary_predicate(&self) -> Predicate {
        self.window.predicate(Field::Date) & self.dimension_predicate()
    }

    /// Predicate over the blog catalog: creation time and author only
    pub fn creation_predicate(&self) -> Predicate {
        let mut p = self.window.predicate(Field::Timestamp);
        if let Some(author) = &self.author {
            p = p & Predicate::eq(Field::Author, author.as_str());
        }
        p
    }

    fn dimension_predicate(&self) -> Predicate {
        let mut p = Predicate::always();
        if let Some(codes) = &self.country_codes {
            p = p & Predicate::in_list(Field::Country, codes.iter().map(String::as_str));
        }
        if let Some(codes) = &self.exclude_country_codes {
            p = p & !Predicate::in_list(Field::Country, codes.iter().map(String::as_str));
        }
        if let Some(author) = &self.author {
            p = p & Predicate::eq(Field::Author, author.as_str());
        }
        p
    }

    /// Canonical JSON form used for cache keys.
    ///
    /// Keys are emitted in sorted order, absent fields are omitted, and a
    /// range shortcut is represented by its name rather than the timestamps
    /// it expanded to.
    pub fn canonical_json(&self) -> JsonValue {
        let mut map = Map::new();
        match self.window {
            TimeWindow::Year(year) => {
                map.insert("year".into(), year.into());
            }
            TimeWindow::Span { start, end } => match self.range {
                Some(range) => {
                    map.insert("range".into(), range.as_str().into());
                }
                None => {
                    if let Some(start) = start {
                        map.insert("start_date".into(), start.to_rfc3339().into());
                    }
                    if let Some(end) = end {
                        map.insert("end_date".into(), end.to_rfc3339().into());
                    }
                }
            },
        }
        if let Some(codes) = &self.country_codes {
            map.insert("country_codes".into(), codes.clone().into());
        }
        if let Some(codes) = &self.exclude_country_codes {
            map.insert("exclude_country_codes".into(), codes.clone().into());
        }
        if let Some(author) = &self.author {
            map.insert("author_username".into(), author.clone().into());
        }
        if let Some(blog_id) = self.blog_id {
            map.insert("blog_id".into(), blog_id.into());
        }
        if let Some(compare) = self.compare {
            map.insert("compare".into(), compare.as_str().into());
        }
        JsonValue::Object(map)
    }
}

fn normalize_codes(
    field: &'static str,
    codes: Option<&[String]>,
    limits: &FilterLimits,
) -> Result<Option<Vec<String>>, ValidationError> {
    let Some(codes) = codes else {
        return Ok(None);
    };
    if codes.is_empty() {
        return Err(ValidationError::EmptyList { field });
    }
    if let Some(long) = codes.iter().find(|c| c.chars().count() > limits.group_code_max_len) {
        return Err(ValidationError::TooLong {
            field,
            value: long.clone(),
            max: limits.group_code_max_len,
        });
    }
    let mut codes = codes.to_vec();
    codes.sort();
    codes.dedup();
    Ok(Some(codes))
}

fn check_bounds(field: &'static str, value: i64, min: i64, max: i64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfBounds {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
