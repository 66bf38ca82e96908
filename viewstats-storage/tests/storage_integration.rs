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

//! Integration tests for the in-memory backends

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;
use viewstats_core::{Field, Predicate, Value, ViewEvent};
use viewstats_storage::{
    AggregateQuery, Dimension, EventStore, MemorySketches, MemoryStore, SketchBackend,
};

fn event(day: i64, country: &str, blog: u64) -> ViewEvent {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    ViewEvent::new(Some(country), "alice", blog, base + Duration::days(day))
}

/// Blog A viewed on day 1 and day 2, blog B on day 1 only
#[test]
fn test_range_distinct_is_union_not_sum() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.insert_events([event(0, "US", 1), event(0, "US", 2), event(1, "US", 1)]);

    let per_day = store.aggregate(
        &AggregateQuery::new(Predicate::always())
            .group_by(Dimension::Day)
            .count_distinct(Dimension::Blog),
    )?;
    let per_day: Vec<u64> = per_day.iter().map(|r| r.distinct).collect();
    assert_eq!(per_day, vec![2, 1]);

    let over_range = store.aggregate(
        &AggregateQuery::new(Predicate::always())
            .group_by(Dimension::Country)
            .count_distinct(Dimension::Blog),
    )?;
    assert_eq!(over_range[0].distinct, 2);
    assert_eq!(over_range[0].count, 3);
    Ok(())
}

#[test]
fn test_sketch_union_matches_member_sets() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.insert_events([
        event(0, "US", 1),
        event(0, "US", 2),
        event(1, "US", 1),
        event(1, "US", 3),
        event(1, "DE", 4),
    ]);
    let sketches = MemorySketches::default();

    let us = Predicate::eq(Field::Country, "US");
    let mut keys = Vec::new();
    let mut union = BTreeSet::new();
    for row in store.member_sets(&us, &[Dimension::Day])? {
        let key = format!("day:{}", row.key[0]);
        let members: Vec<u64> = row.members.iter().copied().collect();
        sketches.add_members(&key, &members)?;
        union.extend(row.members);
        keys.push(key);
    }

    assert_eq!(union.len(), 3);
    assert_eq!(sketches.merged_cardinality(&keys)?, 3);
    Ok(())
}

#[test]
fn test_null_dimension_grouped_as_null() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    store.insert_events([
        event(0, "US", 1),
        ViewEvent::new(None, "bob", 2, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
    ]);

    let all = store.aggregate(&AggregateQuery::new(Predicate::always()).group_by(Dimension::Country))?;
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|r| r.key == vec![Value::Null]));

    let known = store.aggregate(
        &AggregateQuery::new(Predicate::not_null(Field::Country)).group_by(Dimension::Country),
    )?;
    assert_eq!(known.len(), 1);
    Ok(())
}

proptest! {
    #[test]
    fn prop_range_distinct_never_exceeds_daily_sum(
        views in proptest::collection::vec((0i64..10, 1u64..20), 1..200)
    ) {
        let store = MemoryStore::new();
        store.insert_events(views.iter().map(|&(day, blog)| event(day, "US", blog)));

        let daily = store
            .aggregate(
                &AggregateQuery::new(Predicate::always())
                    .group_by(Dimension::Day)
                    .count_distinct(Dimension::Blog),
            )
            .unwrap();
        let daily_sum: u64 = daily.iter().map(|r| r.distinct).sum();

        let range = store
            .aggregate(&AggregateQuery::new(Predicate::always()).count_distinct(Dimension::Blog))
            .unwrap();
        let exact: BTreeSet<u64> = views.iter().map(|&(_, blog)| blog).collect();

        prop_assert_eq!(range[0].distinct, exact.len() as u64);
        prop_assert!(range[0].distinct <= daily_sum);
    }
}
