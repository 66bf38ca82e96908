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

//! Daily summary precomputation
//!
//! Compresses raw view events into one [`DailySummary`] per
//! `(day, country, author)`:
//!
//! 1. Take the lock (unless forced)
//! 2. Aggregate views per key and collect each key's exact blog set
//! 3. Overwrite existing rows in place, insert the rest
//! 4. Commit everything in one transaction
//! 5. Optionally publish each key's blog set as a sketch
//! 6. Record duration and row counts on [`PrecomputeMetrics`]
//!
//! Rerunning over unchanged events leaves every row byte-identical.

use crate::error::{AnalyticsError, Result};
use crate::lock::{DistributedLock, LockGuard, LockOutcome};
use crate::telemetry::PrecomputeMetrics;
use chrono::{Duration as DateDuration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use viewstats_core::{
    AnalyticsConfig, BlogId, DailySummary, Field, Predicate, SummaryKey, Value,
};
use viewstats_storage::{
    sketch_key, AggregateQuery, Dimension, EventStore, SketchBackend, SummaryBatch, SummaryStore,
};

const SUMMARY_DIMENSIONS: [Dimension; 3] = [Dimension::Day, Dimension::Country, Dimension::Author];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecomputeOptions {
    /// First day to process; defaults to the earliest event
    pub since: Option<NaiveDate>,
    /// Compute and report without writing anything
    pub dry_run: bool,
    /// Skip lock acquisition
    pub force: bool,
}

impl PrecomputeOptions {
    /// Process only the last `days` days up to `today`
    pub fn last_days(days: u32, today: NaiveDate) -> Self {
        Self {
            since: Some(today - DateDuration::days(i64::from(days))),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrecomputeReport {
    /// First day processed; `None` when there were no events at all
    pub start_date: Option<NaiveDate>,
    pub created: usize,
    pub updated: usize,
    pub dry_run: bool,
    pub sketches_published: usize,
    pub sketch_failures: usize,
    pub lock: LockOutcome,
    pub elapsed: Duration,
}

struct KeyStats {
    views: u64,
    members: BTreeSet<BlogId>,
}

pub struct PrecomputeJob {
    events: Arc<dyn EventStore>,
    summaries: Arc<dyn SummaryStore>,
    lock: DistributedLock,
    sketches: Option<Arc<dyn SketchBackend>>,
    metrics: PrecomputeMetrics,
    config: AnalyticsConfig,
}

impl PrecomputeJob {
    pub fn new(
        events: Arc<dyn EventStore>,
        summaries: Arc<dyn SummaryStore>,
        lock: DistributedLock,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            events,
            summaries,
            lock,
            sketches: None,
            metrics: PrecomputeMetrics::global(),
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: PrecomputeMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Publish sketches when approximate cardinality is enabled
    pub fn with_sketches(mut self, sketches: Arc<dyn SketchBackend>) -> Self {
        self.sketches = Some(sketches);
        self
    }

    pub fn run(&self, options: &PrecomputeOptions) -> Result<PrecomputeReport> {
        let started = Instant::now();
        let precompute = &self.config.precompute;
        let guard = if options.force {
            warn!(key = %precompute.lock_key, "Forced run, skipping lock");
            LockGuard::skipped(precompute.lock_key.as_str())
        } else {
            self.lock.acquire(&precompute.lock_key, precompute.lock_ttl())?
        };

        let mut report = PrecomputeReport {
            start_date: None,
            created: 0,
            updated: 0,
            dry_run: options.dry_run,
            sketches_published: 0,
            sketch_failures: 0,
            lock: guard.outcome(),
            elapsed: Duration::ZERO,
        };

        let start_date = match options.since {
            Some(since) => Some(since),
            None => self
                .events
                .time_bounds(&Predicate::always())?
                .map(|(first, _)| first.date_naive()),
        };
        let Some(start_date) = start_date else {
            info!("No view events found, nothing to precompute");
            report.elapsed = started.elapsed();
            return Ok(report);
        };
        report.start_date = Some(start_date);
        info!(%start_date, dry_run = options.dry_run, "Precomputing daily summaries");

        let computed = self.collect(start_date)?;
        if computed.is_empty() {
            info!(%start_date, "No view events in range, nothing to precompute");
            report.elapsed = started.elapsed();
            return Ok(report);
        }

        let batch = self.plan(start_date, &computed)?;
        report.created = batch.inserts.len();
        report.updated = batch.updates.len();

        if options.dry_run {
            report.elapsed = started.elapsed();
            info!(
                created = report.created,
                updated = report.updated,
                "Dry run, no summaries written"
            );
            return Ok(report);
        }

        self.summaries
            .commit(batch)
            .map_err(AnalyticsError::Persistence)?;

        if self.config.cardinality.use_approximate {
            if let Some(sketches) = &self.sketches {
                let (published, failed) = self.publish(sketches.as_ref(), &computed);
                report.sketches_published = published;
                report.sketch_failures = failed;
            }
        }

        report.elapsed = started.elapsed();
        info!(
            created = report.created,
            updated = report.updated,
            sketches = report.sketches_published,
            sketch_failures = report.sketch_failures,
            lock = %report.lock,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Precompute finished"
        );
        self.metrics.record(&report);
        drop(guard);
        Ok(report)
    }

    /// Views and exact blog sets per summary key from `start_date` on
    fn collect(&self, start_date: NaiveDate) -> Result<BTreeMap<SummaryKey, KeyStats>> {
        let filter = Predicate::at_least(Field::Date, start_date);

        let mut computed = BTreeMap::new();
        let totals = self.events.aggregate(
            &AggregateQuery::new(filter.clone())
                .group_by(Dimension::Day)
                .group_by(Dimension::Country)
                .group_by(Dimension::Author),
        )?;
        for row in totals {
            if let Some(key) = summary_key(&row.key) {
                computed.insert(
                    key,
                    KeyStats {
                        views: row.count,
                        members: BTreeSet::new(),
                    },
                );
            }
        }

        for row in self.events.member_sets(&filter, &SUMMARY_DIMENSIONS)? {
            if let Some(stats) = summary_key(&row.key).and_then(|key| computed.get_mut(&key)) {
                stats.members = row.members;
            }
        }
        Ok(computed)
    }

    /// Split computed keys into updates of existing rows and inserts
    fn plan(
        &self,
        start_date: NaiveDate,
        computed: &BTreeMap<SummaryKey, KeyStats>,
    ) -> Result<SummaryBatch> {
        let mut existing: HashMap<SummaryKey, DailySummary> = self
            .summaries
            .scan(&Predicate::at_least(Field::Date, start_date))?
            .into_iter()
            .map(|row| (row.key.clone(), row))
            .collect();

        let mut batch = SummaryBatch::default();
        for (key, stats) in computed {
            match existing.remove(key) {
                Some(mut row) => {
                    row.overwrite(stats.views, stats.members.clone());
                    batch.updates.push(row);
                }
                None => batch.inserts.push(DailySummary::new(
                    key.clone(),
                    stats.views,
                    stats.members.clone(),
                )),
            }
        }
        Ok(batch)
    }

    /// Returns `(published, failed)`; failures are logged and never abort the run
    fn publish(
        &self,
        sketches: &dyn SketchBackend,
        computed: &BTreeMap<SummaryKey, KeyStats>,
    ) -> (usize, usize) {
        let prefix = &self.config.cache.key_prefix;
        let retention = self.config.cardinality.sketch_retention();
        let mut published = 0;
        let mut failed = 0;

        for (key, stats) in computed {
            let sketch = sketch_key(prefix, key);
            let members: Vec<BlogId> = stats.members.iter().copied().collect();
            let result = sketches
                .add_members(&sketch, &members)
                .and_then(|()| sketches.set_expiry(&sketch, retention));
            match result {
                Ok(()) => published += 1,
                Err(e) => {
                    failed += 1;
                    warn!(key = %sketch, error = %e, "Failed to publish sketch");
                }
            }
        }
        (published, failed)
    }
}

fn summary_key(values: &[Value]) -> Option<SummaryKey> {
    match values {
        [date, country, author] => Some(SummaryKey::new(
            date.as_date()?,
            country.as_text().map(str::to_string),
            author.as_text().map(str::to_string),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use opentelemetry::metrics::MeterProvider;
    use opentelemetry_sdk::metrics::data::{Histogram as HistogramData, Metric, ResourceMetrics, Sum};
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::runtime;
    use opentelemetry_sdk::testing::metrics::InMemoryMetricsExporter;
    use viewstats_core::ViewEvent;
    use viewstats_storage::{MemorySketches, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, PrecomputeJob) {
        let store = Arc::new(MemoryStore::new());
        let day = |d: u32, h: u32| Utc.with_ymd_and_hms(2025, 1, d, h, 0, 0).unwrap();
        store.insert_events([
            ViewEvent::new(Some("US"), "alice", 1, day(1, 9)),
            ViewEvent::new(Some("US"), "alice", 1, day(1, 10)),
            ViewEvent::new(Some("US"), "alice", 2, day(1, 11)),
            ViewEvent::new(Some("US"), "alice", 1, day(2, 9)),
            ViewEvent::new(None, "bob", 3, day(2, 9)),
        ]);
        let config = AnalyticsConfig::default();
        let lock = DistributedLock::new(&config.precompute).with_advisory(store.clone());
        let job = PrecomputeJob::new(store.clone(), store.clone(), lock, config);
        (store, job)
    }

    #[test]
    fn test_builds_one_row_per_key() {
        let (store, job) = setup();
        let report = job.run(&PrecomputeOptions::default()).unwrap();

        assert_eq!(report.start_date, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(report.created, 3);
        assert_eq!(report.updated, 0);
        assert_eq!(report.lock, LockOutcome::Acquired("advisory"));

        let rows = store.summaries();
        assert_eq!(rows.len(), 3);
        let jan1 = &rows[0];
        assert_eq!(jan1.key.country.as_deref(), Some("US"));
        assert_eq!(jan1.total_views, 3);
        assert_eq!(jan1.distinct_blogs(), 2);
    }

    #[test]
    fn test_rerun_updates_in_place() {
        let (store, job) = setup();
        job.run(&PrecomputeOptions::default()).unwrap();
        let before = store.summaries();

        let report = job.run(&PrecomputeOptions::default()).unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 3);
        assert_eq!(store.summaries(), before);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (store, job) = setup();
        let report = job
            .run(&PrecomputeOptions {
                dry_run: true,
                ..Default::default()
            })
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.created, 3);
        assert!(!store.has_summaries().unwrap());
    }

    #[test]
    fn test_since_limits_range() {
        let (store, job) = setup();
        let today = NaiveDate::from_ymd_opt(2025, 1, 3).unwrap();
        let report = job.run(&PrecomputeOptions::last_days(1, today)).unwrap();
        assert_eq!(report.start_date, NaiveDate::from_ymd_opt(2025, 1, 2));
        assert_eq!(report.created, 2);
        assert!(store.summaries().iter().all(|s| s.date() >= today.pred_opt().unwrap()));
    }

    #[test]
    fn test_empty_event_log_is_zero_work() {
        let store = Arc::new(MemoryStore::new());
        let config = AnalyticsConfig::default();
        let job = PrecomputeJob::new(
            store.clone(),
            store.clone(),
            DistributedLock::new(&config.precompute),
            config,
        );
        let report = job.run(&PrecomputeOptions::default()).unwrap();
        assert_eq!(report.start_date, None);
        assert_eq!(report.created, 0);
        assert_eq!(report.lock, LockOutcome::Unguarded);
    }

    #[test]
    fn test_publishes_sketches_when_enabled() {
        let store = Arc::new(MemoryStore::new());
        store.insert_events([ViewEvent::new(
            Some("US"),
            "alice",
            1,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )]);
        let mut config = AnalyticsConfig::default();
        config.cardinality.use_approximate = true;
        let sketches = Arc::new(MemorySketches::default());
        let job = PrecomputeJob::new(
            store.clone(),
            store.clone(),
            DistributedLock::new(&config.precompute),
            config,
        )
        .with_sketches(sketches.clone());

        let report = job.run(&PrecomputeOptions::default()).unwrap();
        assert_eq!(report.sketches_published, 1);
        assert!(sketches.contains("analytics:hll:2025-01-01:US:alice"));
    }

    #[test]
    fn test_sketch_failures_are_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.insert_events([ViewEvent::new(
            Some("US"),
            "alice",
            1,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )]);
        let mut config = AnalyticsConfig::default();
        config.cardinality.use_approximate = true;
        let sketches = Arc::new(MemorySketches::default());
        sketches.set_offline(true);
        let job = PrecomputeJob::new(
            store.clone(),
            store.clone(),
            DistributedLock::new(&config.precompute),
            config,
        )
        .with_sketches(sketches);

        let report = job.run(&PrecomputeOptions::default()).unwrap();
        assert_eq!(report.sketch_failures, 1);
        assert_eq!(report.sketches_published, 0);
        assert!(store.has_summaries().unwrap());
    }

    fn exported<'a>(batches: &'a [ResourceMetrics], name: &str) -> &'a Metric {
        batches
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
            .filter(|m| m.name == name)
            .last()
            .unwrap_or_else(|| panic!("{name} not exported"))
    }

    fn counter_total(batches: &[ResourceMetrics], name: &str) -> u64 {
        let sum = exported(batches, name)
            .data
            .as_any()
            .downcast_ref::<Sum<u64>>()
            .unwrap();
        sum.data_points.iter().map(|p| p.value).sum()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_records_run_metrics() {
        let exporter = InMemoryMetricsExporter::default();
        let reader = PeriodicReader::builder(exporter.clone(), runtime::Tokio).build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();

        let (_store, job) = setup();
        let job = job.with_metrics(PrecomputeMetrics::new(&provider.meter("viewstats-test")));
        job.run(&PrecomputeOptions::default()).unwrap();
        job.run(&PrecomputeOptions::default()).unwrap();
        job.run(&PrecomputeOptions {
            dry_run: true,
            ..Default::default()
        })
        .unwrap();

        provider.force_flush().unwrap();
        let batches = exporter.get_finished_metrics().unwrap();

        assert_eq!(counter_total(&batches, "precalc.created"), 3);
        assert_eq!(counter_total(&batches, "precalc.updated"), 3);
        let durations = exported(&batches, "precalc.duration_ms")
            .data
            .as_any()
            .downcast_ref::<HistogramData<f64>>()
            .unwrap();
        // Dry runs are not recorded
        assert_eq!(durations.data_points.iter().map(|p| p.count).sum::<u64>(), 2);
    }
}
