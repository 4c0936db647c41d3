// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Windowed store: a fixed ring of per-day buckets.

use std::sync::{PoisonError, RwLock};

use daystat_core::{Absorbed, Day, KindMismatch, Metric, MetricFamily};

/// Name of every family produced by a [`DailyStore`].
pub const DAILY_FAMILY: &str = "daily";

/// Where [`DailyStore::handle`] put an incoming metric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Routed {
    /// Appended to the current day's bucket (or started the very first bucket).
    Inserted,
    /// Merged into an existing entry of the current day.
    Merged,
    /// Merged into an existing entry of the current day, and a counter overflow reset it.
    Reset,
    /// A newer day started a fresh bucket, overwriting the oldest slot. `evicted` is the day
    /// that slot held, if it held one.
    Rolled {
        /// The day that was dropped from the window.
        evicted: Option<Day>,
    },
    /// The metric is for an earlier day that is still in the window. It was merged into that
    /// day's bucket, or started one in a free slot or in the slot of an older day.
    Backfilled {
        /// The older day whose slot was taken, if any.
        evicted: Option<Day>,
        /// A counter overflow reset the merged entry.
        reset: bool,
    },
    /// The metric is for a day at least `window` days before the current one, or every slot
    /// holds a newer day. It was dropped.
    Stale,
    /// An entry with the same labels had a different kind. The metric was dropped.
    Conflict(KindMismatch),
}

impl From<Result<Absorbed, KindMismatch>> for Routed {
    fn from(absorbed: Result<Absorbed, KindMismatch>) -> Self {
        match absorbed {
            Ok(Absorbed::Inserted) => Routed::Inserted,
            Ok(Absorbed::Merged) => Routed::Merged,
            Ok(Absorbed::Reset) => Routed::Reset,
            Err(conflict) => Routed::Conflict(conflict),
        }
    }
}

#[derive(Debug)]
struct Ring {
    buckets: Vec<MetricFamily>,
    cur: usize,
}

impl Ring {
    /// Slot holding the oldest day, or an empty slot if there is one.
    fn oldest(&self) -> usize {
        self.buckets
            .iter()
            .enumerate()
            .min_by_key(|(_, bucket)| bucket.day)
            .map_or(self.cur, |(slot, _)| slot)
    }

    /// The slot a new day overwrites: `preferred` when it is free or holds the oldest day,
    /// which is always the case unless late days were backfilled out of order.
    fn vacancy(&self, preferred: usize) -> usize {
        let oldest = self.oldest();
        if self.buckets[preferred].day == self.buckets[oldest].day {
            preferred
        } else {
            oldest
        }
    }

    fn backfill(&mut self, metric: &Metric, current: Day) -> Routed {
        let window = i64::try_from(self.buckets.len()).unwrap_or(i64::MAX);
        if metric.day.0 <= current.0.saturating_sub(window) {
            return Routed::Stale;
        }
        if let Some(bucket) = self
            .buckets
            .iter_mut()
            .find(|bucket| bucket.day == Some(metric.day))
        {
            return match bucket.absorb(metric) {
                Ok(absorbed) => Routed::Backfilled {
                    evicted: None,
                    reset: absorbed == Absorbed::Reset,
                },
                Err(conflict) => Routed::Conflict(conflict),
            };
        }
        let slot = self.oldest();
        match self.buckets[slot].day {
            Some(oldest) if oldest >= metric.day => Routed::Stale,
            _ => {
                let evicted = std::mem::replace(&mut self.buckets[slot], seeded_bucket(metric));
                Routed::Backfilled {
                    evicted: evicted.day,
                    reset: false,
                }
            }
        }
    }
}

/// Keeps the most recent `window` days of metrics, one [`MetricFamily`] per day.
///
/// Buckets form a ring. A metric for a day newer than the current bucket moves the cursor one
/// slot back and overwrites whatever that slot held, so once the ring is full every new day
/// evicts the oldest one. A late metric for a day less than `window` days before the current
/// one is still kept. Writes take an exclusive lock on the ring, reads a shared lock.
///
/// ```
/// use daystat_aggregation::{DailyStore, Routed};
/// use daystat_core::{Day, Metric, MetricValue, labels};
///
/// let store = DailyStore::new(2);
/// for day in [10, 11, 12] {
///     store.handle(&Metric::new(labels!["api" => "/x"], Day(day), MetricValue::Counter(1)));
/// }
/// assert_eq!(store.days(), [Day(12), Day(11)]);
/// ```
#[derive(Debug)]
pub struct DailyStore {
    ring: RwLock<Ring>,
}

impl DailyStore {
    /// Creates a store holding `window` days.
    ///
    /// # Panics
    ///
    /// Panics if `window` is 0.
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "the daily window must hold at least one day");
        Self {
            ring: RwLock::new(Ring {
                buckets: (0..window).map(|_| empty_bucket(None)).collect(),
                cur: 0,
            }),
        }
    }

    /// Number of days the ring holds.
    pub fn window(&self) -> usize {
        self.ring
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .buckets
            .len()
    }

    /// Routes `metric` to the bucket for its day, cloning it on first insert and merging in
    /// place afterwards.
    pub fn handle(&self, metric: &Metric) -> Routed {
        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let window = ring.buckets.len();
        let cur = ring.cur;
        let current = ring.buckets[cur].day;

        match current {
            None => {
                ring.buckets[cur] = seeded_bucket(metric);
                Routed::Inserted
            }
            Some(day) if day == metric.day => ring.buckets[cur].absorb(metric).into(),
            Some(day) if metric.day > day => {
                let next = ring.vacancy((cur + window - 1) % window);
                ring.cur = next;
                let evicted = std::mem::replace(&mut ring.buckets[next], seeded_bucket(metric));
                Routed::Rolled {
                    evicted: evicted.day,
                }
            }
            Some(day) => ring.backfill(metric, day),
        }
    }

    /// Deep copy of the bucket for `today - days_ago + 1`, so `1` is today. Returns an empty
    /// family for that day when the window holds no such bucket.
    pub fn get_by_index(&self, days_ago: u32, today: Day) -> MetricFamily {
        let target = today.days_ago(days_ago);
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        ring.buckets
            .iter()
            .find(|bucket| bucket.day == Some(target))
            .cloned()
            .unwrap_or_else(|| empty_bucket(Some(target)))
    }

    /// Days currently held, most recent first.
    pub fn days(&self) -> Vec<Day> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        let mut days: Vec<Day> = ring.buckets.iter().filter_map(|bucket| bucket.day).collect();
        days.sort_unstable_by(|a, b| b.cmp(a));
        days
    }
}

fn empty_bucket(day: Option<Day>) -> MetricFamily {
    MetricFamily::new(DAILY_FAMILY, day)
}

fn seeded_bucket(metric: &Metric) -> MetricFamily {
    let mut bucket = empty_bucket(Some(metric.day));
    bucket.metrics.push(metric.clone());
    bucket
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use daystat_core::{Labels, MetricValue, labels};
    use rstest::rstest;

    use super::*;

    fn counter(labels: Labels, day: i64, value: u64) -> Metric {
        Metric::new(labels, Day(day), MetricValue::Counter(value))
    }

    #[test]
    fn first_metric_starts_a_bucket() {
        let store = DailyStore::new(7);
        check!(store.days().is_empty());
        check!(store.handle(&counter(labels!["api" => "/x"], 100, 1)) == Routed::Inserted);
        check!(store.days() == [Day(100)]);
    }

    #[test]
    fn same_day_same_labels_sum() {
        let store = DailyStore::new(7);
        let labels = labels!["method" => "GET", "path" => "/x"];
        store.handle(&counter(labels.clone(), 100, 2));
        check!(store.handle(&counter(labels.clone(), 100, 3)) == Routed::Merged);

        let bucket = store.get_by_index(1, Day(100));
        check!(bucket.metrics.len() == 1);
        check!(bucket.metrics[0].value == MetricValue::Counter(5));
    }

    #[test]
    fn same_day_new_labels_append() {
        let store = DailyStore::new(7);
        store.handle(&counter(labels!["path" => "/x"], 100, 1));
        check!(store.handle(&counter(labels!["path" => "/y"], 100, 1)) == Routed::Inserted);
        check!(store.get_by_index(1, Day(100)).metrics.len() == 2);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(7)]
    fn one_more_day_than_window_evicts_the_oldest(#[case] window: usize) {
        let store = DailyStore::new(window);
        for day in 0..window as i64 {
            let routed = store.handle(&counter(labels!["api" => "/x"], 100 + day, 1));
            check!(matches!(routed, Routed::Inserted | Routed::Rolled { evicted: None }));
        }
        check!(store.days().len() == window);

        let routed = store.handle(&counter(labels!["api" => "/x"], 100 + window as i64, 1));
        check!(routed == Routed::Rolled { evicted: Some(Day(100)) });
        let days = store.days();
        check!(days.len() == window);
        check!(!days.contains(&Day(100)));
        check!(days[0] == Day(100 + window as i64));
    }

    #[test]
    fn get_by_index_counts_today_as_one() {
        let store = DailyStore::new(7);
        store.handle(&counter(labels!["api" => "/x"], 99, 1));
        store.handle(&counter(labels!["api" => "/x"], 100, 2));

        let today = store.get_by_index(1, Day(100));
        check!(today.day == Some(Day(100)));
        check!(today.metrics[0].value == MetricValue::Counter(2));

        let yesterday = store.get_by_index(2, Day(100));
        check!(yesterday.day == Some(Day(99)));
        check!(yesterday.metrics[0].value == MetricValue::Counter(1));
    }

    #[test]
    fn missing_day_yields_empty_family() {
        let store = DailyStore::new(7);
        store.handle(&counter(labels!["api" => "/x"], 100, 1));
        let bucket = store.get_by_index(3, Day(100));
        check!(bucket.name == DAILY_FAMILY);
        check!(bucket.day == Some(Day(98)));
        check!(bucket.is_empty());
    }

    #[test]
    fn reads_are_deep_copies() {
        let store = DailyStore::new(7);
        let labels = labels!["api" => "/x"];
        store.handle(&counter(labels.clone(), 100, 1));
        let mut copy = store.get_by_index(1, Day(100));
        copy.metrics.clear();
        check!(store.get_by_index(1, Day(100)).metrics.len() == 1);
    }

    #[test]
    fn late_metric_backfills_a_day_still_in_the_window() {
        let store = DailyStore::new(7);
        let labels = labels!["api" => "/x"];
        store.handle(&counter(labels.clone(), 99, 1));
        store.handle(&counter(labels.clone(), 100, 1));
        check!(
            store.handle(&counter(labels.clone(), 99, 4))
                == Routed::Backfilled { evicted: None, reset: false }
        );
        check!(store.get_by_index(2, Day(100)).metrics[0].value == MetricValue::Counter(5));
        check!(store.get_by_index(1, Day(100)).metrics[0].value == MetricValue::Counter(1));
    }

    #[test]
    fn late_metric_outside_the_window_is_stale() {
        let store = DailyStore::new(2);
        store.handle(&counter(labels!["api" => "/x"], 100, 1));
        check!(store.handle(&counter(labels!["api" => "/x"], 98, 1)) == Routed::Stale);
        check!(store.days() == [Day(100)]);
    }

    #[test]
    fn late_metric_starts_its_day_in_a_free_slot() {
        let store = DailyStore::new(3);
        store.handle(&counter(labels!["api" => "/x"], 10, 1));
        store.handle(&counter(labels!["api" => "/x"], 12, 1));
        let routed = store.handle(&counter(labels!["api" => "/x"], 11, 5));
        check!(routed == Routed::Backfilled { evicted: None, reset: false });
        check!(store.days() == [Day(12), Day(11), Day(10)]);
        check!(store.get_by_index(2, Day(12)).metrics[0].value == MetricValue::Counter(5));

        // the next day still evicts the oldest one, not the backfilled one
        let routed = store.handle(&counter(labels!["api" => "/x"], 13, 1));
        check!(routed == Routed::Rolled { evicted: Some(Day(10)) });
        check!(store.days() == [Day(13), Day(12), Day(11)]);
    }

    #[test]
    fn late_metric_takes_the_slot_of_an_older_day() {
        let store = DailyStore::new(3);
        for day in [10, 13, 12] {
            store.handle(&counter(labels!["api" => "/x"], day, 1));
        }
        // 10 fell out of the window when 13 arrived, but nothing needed its slot yet
        check!(store.days() == [Day(13), Day(12), Day(10)]);
        let routed = store.handle(&counter(labels!["api" => "/x"], 11, 1));
        check!(routed == Routed::Backfilled { evicted: Some(Day(10)), reset: false });
        check!(store.days() == [Day(13), Day(12), Day(11)]);
        check!(store.handle(&counter(labels!["api" => "/x"], 10, 1)) == Routed::Stale);
    }

    #[test]
    fn counter_overflow_in_a_backfilled_day_is_reported() {
        let store = DailyStore::new(7);
        let labels = labels!["api" => "/x"];
        store.handle(&counter(labels.clone(), 99, u64::MAX));
        store.handle(&counter(labels.clone(), 100, 1));
        let routed = store.handle(&counter(labels.clone(), 99, 1));
        check!(routed == Routed::Backfilled { evicted: None, reset: true });
        check!(store.get_by_index(2, Day(100)).metrics[0].value == MetricValue::Counter(0));
    }

    #[test]
    fn day_gap_rotates_a_single_slot() {
        let store = DailyStore::new(7);
        store.handle(&counter(labels!["api" => "/x"], 100, 1));
        store.handle(&counter(labels!["api" => "/x"], 105, 1));
        check!(store.days() == [Day(105), Day(100)]);
        check!(store.get_by_index(3, Day(105)).is_empty());
    }

    #[test]
    fn kind_conflict_is_reported_and_dropped() {
        let store = DailyStore::new(7);
        let labels = labels!["api" => "/x"];
        store.handle(&counter(labels.clone(), 100, 1));
        let routed = store.handle(&Metric::new(labels.clone(), Day(100), MetricValue::Gauge(9)));
        check!(let Routed::Conflict(_) = routed);
        check!(store.get_by_index(1, Day(100)).metrics[0].value == MetricValue::Counter(1));
    }

    #[test]
    #[should_panic(expected = "at least one day")]
    fn zero_window_panics() {
        DailyStore::new(0);
    }
}
