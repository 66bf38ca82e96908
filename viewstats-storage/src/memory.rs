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

//! In-memory store
//!
//! Reference implementation of every data-access trait, backed by
//! `parking_lot` locks. Summary commits validate the whole batch before
//! touching the table, so a rejected batch leaves no trace.

use crate::access::{
    AdvisoryLocks, AggregateQuery, AggregateRow, Dimension, EventStore, MemberSetRow,
    SummaryBatch, SummaryStore,
};
use crate::error::{BackendError, StorageError};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;
use viewstats_core::{
    BlogId, BlogRecord, DailySummary, Granularity, Predicate, SummaryId, SummaryKey, Value,
    ViewEvent,
};

#[derive(Default)]
struct SummaryTable {
    rows: BTreeMap<SummaryKey, DailySummary>,
    next_id: SummaryId,
}

/// Events, blogs, summaries and advisory locks held in process memory
#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<Vec<ViewEvent>>,
    blogs: RwLock<BTreeMap<BlogId, BlogRecord>>,
    summaries: RwLock<SummaryTable>,
    advisory: Mutex<HashSet<i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_events<I: IntoIterator<Item = ViewEvent>>(&self, events: I) {
        self.events.write().extend(events);
    }

    pub fn insert_blog(&self, blog: BlogRecord) {
        self.blogs.write().insert(blog.id, blog);
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// Every stored summary, ordered by key
    pub fn summaries(&self) -> Vec<DailySummary> {
        self.summaries.read().rows.values().cloned().collect()
    }

    fn check_batch(table: &SummaryTable, batch: &SummaryBatch) -> Result<(), StorageError> {
        let mut seen = HashSet::with_capacity(batch.len());
        for row in &batch.inserts {
            if row.id.is_some() || table.rows.contains_key(&row.key) || !seen.insert(&row.key) {
                return Err(StorageError::Conflict(row.key.clone()));
            }
        }
        for row in &batch.updates {
            let stored = table.rows.get(&row.key);
            if stored.is_none() || stored.and_then(|s| s.id) != row.id || !seen.insert(&row.key) {
                return Err(StorageError::Missing(row.key.clone()));
            }
        }
        Ok(())
    }
}

impl EventStore for MemoryStore {
    fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>, StorageError> {
        let events = self.events.read();
        let mut groups: BTreeMap<Vec<Value>, (u64, BTreeSet<Value>)> = BTreeMap::new();

        for event in events.iter().filter(|e| query.filter.matches(*e)) {
            let key = query.group_by.iter().map(|d| d.extract(event)).collect();
            let (count, distinct) = groups.entry(key).or_default();
            *count += 1;
            if let Some(target) = &query.distinct {
                let value = target.extract(event);
                if !value.is_null() {
                    distinct.insert(value);
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, (count, distinct))| AggregateRow {
                key,
                count,
                distinct: distinct.len() as u64,
            })
            .collect())
    }

    fn member_sets(
        &self,
        filter: &Predicate,
        group_by: &[Dimension],
    ) -> Result<Vec<MemberSetRow>, StorageError> {
        let events = self.events.read();
        let mut groups: BTreeMap<Vec<Value>, BTreeSet<BlogId>> = BTreeMap::new();

        for event in events.iter().filter(|e| filter.matches(*e)) {
            let key = group_by.iter().map(|d| d.extract(event)).collect();
            groups.entry(key).or_default().insert(event.blog_id);
        }

        Ok(groups
            .into_iter()
            .map(|(key, members)| MemberSetRow { key, members })
            .collect())
    }

    fn time_bounds(
        &self,
        filter: &Predicate,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, StorageError> {
        let events = self.events.read();
        Ok(events
            .iter()
            .filter(|e| filter.matches(*e))
            .fold(None, |bounds, e| match bounds {
                None => Some((e.timestamp, e.timestamp)),
                Some((first, last)) => Some((first.min(e.timestamp), last.max(e.timestamp))),
            }))
    }

    fn blog_titles(&self, ids: &[BlogId]) -> Result<HashMap<BlogId, String>, StorageError> {
        let blogs = self.blogs.read();
        Ok(ids
            .iter()
            .filter_map(|id| blogs.get(id).map(|b| (*id, b.title.clone())))
            .collect())
    }

    fn blog_creations(
        &self,
        filter: &Predicate,
        granularity: Granularity,
    ) -> Result<Vec<(NaiveDate, u64)>, StorageError> {
        let blogs = self.blogs.read();
        let mut periods: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for blog in blogs.values().filter(|b| filter.matches(*b)) {
            *periods
                .entry(granularity.truncate(blog.created_at.date_naive()))
                .or_default() += 1;
        }
        Ok(periods.into_iter().collect())
    }
}

impl SummaryStore for MemoryStore {
    fn has_summaries(&self) -> Result<bool, StorageError> {
        Ok(!self.summaries.read().rows.is_empty())
    }

    fn get(&self, key: &SummaryKey) -> Result<Option<DailySummary>, StorageError> {
        Ok(self.summaries.read().rows.get(key).cloned())
    }

    fn scan(&self, filter: &Predicate) -> Result<Vec<DailySummary>, StorageError> {
        Ok(self
            .summaries
            .read()
            .rows
            .values()
            .filter(|s| filter.matches(*s))
            .cloned()
            .collect())
    }

    fn commit(&self, batch: SummaryBatch) -> Result<(), StorageError> {
        let mut table = self.summaries.write();
        Self::check_batch(&table, &batch)?;
        debug!(
            inserts = batch.inserts.len(),
            updates = batch.updates.len(),
            "Committing summary batch"
        );

        for mut row in batch.inserts {
            table.next_id += 1;
            row.id = Some(table.next_id);
            table.rows.insert(row.key.clone(), row);
        }
        for row in batch.updates {
            table.rows.insert(row.key.clone(), row);
        }
        Ok(())
    }
}

impl AdvisoryLocks for MemoryStore {
    fn try_advisory_lock(&self, id: i64) -> Result<bool, BackendError> {
        Ok(self.advisory.lock().insert(id))
    }

    fn advisory_unlock(&self, id: i64) -> Result<(), BackendError> {
        self.advisory.lock().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use viewstats_core::Field;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_events([
            ViewEvent::new(Some("US"), "alice", 1, at(1, 9)),
            ViewEvent::new(Some("US"), "alice", 1, at(1, 10)),
            ViewEvent::new(Some("US"), "alice", 2, at(1, 11)),
            ViewEvent::new(Some("DE"), "bob", 3, at(2, 9)),
            ViewEvent::new(None, "bob", 3, at(3, 9)),
        ]);
        store
    }

    fn summary(day: u32, country: &str, total: u64, ids: &[BlogId]) -> DailySummary {
        DailySummary::new(
            SummaryKey::new(
                NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
                Some(country.to_string()),
                None,
            ),
            total,
            ids.iter().copied().collect(),
        )
    }

    #[test]
    fn test_aggregate_groups_and_distinct() {
        let store = seeded();
        let rows = store
            .aggregate(
                &AggregateQuery::new(Predicate::always())
                    .group_by(Dimension::Country)
                    .count_distinct(Dimension::Blog),
            )
            .unwrap();

        // Null sorts first
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].key, vec![Value::Null]);
        assert_eq!(rows[2].key, vec![Value::from("US")]);
        assert_eq!(rows[2].count, 3);
        assert_eq!(rows[2].distinct, 2);
    }

    #[test]
    fn test_member_sets_and_bounds() {
        let store = seeded();
        let filter = Predicate::eq(Field::Author, "bob");
        let sets = store.member_sets(&filter, &[Dimension::Day]).unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.iter().all(|s| s.members == BTreeSet::from([3])));

        let (first, last) = store.time_bounds(&filter).unwrap().unwrap();
        assert_eq!(first, at(2, 9));
        assert_eq!(last, at(3, 9));
        assert!(store
            .time_bounds(&Predicate::eq(Field::Author, "carol"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_commit_assigns_ids_and_keeps_them_on_update() {
        let store = MemoryStore::new();
        store
            .commit(SummaryBatch {
                inserts: vec![summary(1, "US", 3, &[1, 2])],
                updates: vec![],
            })
            .unwrap();

        let mut stored = store.summaries().remove(0);
        let id = stored.id;
        assert!(id.is_some());

        stored.overwrite(5, [1, 2, 4].into_iter().collect());
        store
            .commit(SummaryBatch {
                inserts: vec![],
                updates: vec![stored],
            })
            .unwrap();

        let rows = store.summaries();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].total_views, 5);
        assert_eq!(rows[0].distinct_blogs(), 3);
    }

    #[test]
    fn test_rejected_batch_applies_nothing() {
        let store = MemoryStore::new();
        store
            .commit(SummaryBatch {
                inserts: vec![summary(1, "US", 3, &[1])],
                updates: vec![],
            })
            .unwrap();

        // Second insert for an existing key poisons the whole batch
        let result = store.commit(SummaryBatch {
            inserts: vec![summary(2, "US", 1, &[1]), summary(1, "US", 9, &[9])],
            updates: vec![],
        });
        assert!(matches!(result, Err(StorageError::Conflict(_))));
        assert_eq!(store.summaries().len(), 1);
        assert_eq!(store.summaries()[0].total_views, 3);
    }

    #[test]
    fn test_update_of_unknown_row_rejected() {
        let store = MemoryStore::new();
        let mut row = summary(1, "US", 1, &[1]);
        row.id = Some(42);
        let result = store.commit(SummaryBatch {
            inserts: vec![],
            updates: vec![row],
        });
        assert!(matches!(result, Err(StorageError::Missing(_))));
        assert!(!store.has_summaries().unwrap());
    }

    #[test]
    fn test_blog_creations_by_period() {
        let store = MemoryStore::new();
        for (id, day) in [(1, 6), (2, 8), (3, 13)] {
            store.insert_blog(BlogRecord {
                id,
                title: format!("Blog {id}"),
                author: "alice".into(),
                created_at: at(day, 12),
            });
        }
        let weekly = store
            .blog_creations(&Predicate::always(), Granularity::Week)
            .unwrap();
        assert_eq!(
            weekly,
            vec![
                (NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(), 2),
                (NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(), 1),
            ]
        );
        let titles = store.blog_titles(&[1, 99]).unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[&1], "Blog 1");
    }

    #[test]
    fn test_advisory_lock_is_exclusive() {
        let store = MemoryStore::new();
        assert!(store.try_advisory_lock(7).unwrap());
        assert!(!store.try_advisory_lock(7).unwrap());
        store.advisory_unlock(7).unwrap();
        assert!(store.try_advisory_lock(7).unwrap());
    }
}
