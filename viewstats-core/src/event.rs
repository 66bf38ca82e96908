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

//! Raw facts: view events and the blogs they point at.

use crate::predicate::{Field, Record, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blog identifier
pub type BlogId = u64;

/// One observed view of a blog.
///
/// Written once by ingestion, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEvent {
    /// Country code the view originated from, if known
    pub country: Option<String>,
    /// Username of the blog's author
    pub author: String,
    pub blog_id: BlogId,
    pub timestamp: DateTime<Utc>,
}

impl ViewEvent {
    pub fn new(
        country: Option<&str>,
        author: impl Into<String>,
        blog_id: BlogId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            country: country.map(str::to_string),
            author: author.into(),
            blog_id,
            timestamp,
        }
    }
}

impl Record for ViewEvent {
    fn value(&self, field: Field) -> Value {
        match field {
            Field::Timestamp => Value::Time(self.timestamp),
            Field::Date => Value::Date(self.timestamp.date_naive()),
            Field::Country => Value::from(self.country.as_deref()),
            Field::Author => Value::Text(self.author.clone()),
            Field::Blog => Value::Id(self.blog_id),
        }
    }
}

/// Blog catalog entry, used for titles and creation-based breadth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogRecord {
    pub id: BlogId,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl Record for BlogRecord {
    fn value(&self, field: Field) -> Value {
        match field {
            // A blog's own time is its creation time
            Field::Timestamp => Value::Time(self.created_at),
            Field::Date => Value::Date(self.created_at.date_naive()),
            Field::Country => Value::Null,
            Field::Author => Value::Text(self.author.clone()),
            Field::Blog => Value::Id(self.id),
        }
    }
}
