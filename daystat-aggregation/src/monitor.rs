// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The aggregation facade that feeds both stores and answers label and day queries.

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use daystat_core::{Absorbed, Day, Label, Metric, MetricFamily, MetricValue, ParseError};
use daystat_timesource::TimeSource;
use tracing::{debug, trace, warn};

use crate::{DailyStore, LifetimeStore, Routed};

const WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Label names containing this are omitted by threshold-based label discovery.
const SERIES_NAME_FRAGMENT: &str = "api";

/// Selects one family to read: a day in the window, or the lifetime accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DaySelector {
    /// The lifetime family.
    Lifetime,
    /// The day `n - 1` days before today; `DaysAgo(1)` is today.
    DaysAgo(u32),
}

impl DaySelector {
    /// Today's bucket.
    pub const TODAY: DaySelector = DaySelector::DaysAgo(1);
}

/// Accepts `lifetime`, `all` or `0` for [`DaySelector::Lifetime`], and a positive day count for
/// [`DaySelector::DaysAgo`].
impl FromStr for DaySelector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("lifetime") || s.eq_ignore_ascii_case("all") {
            return Ok(DaySelector::Lifetime);
        }
        match s.parse::<u32>() {
            Ok(0) => Ok(DaySelector::Lifetime),
            Ok(n) => Ok(DaySelector::DaysAgo(n)),
            Err(_) => Err(ParseError::DaySelector(s.to_owned())),
        }
    }
}

impl fmt::Display for DaySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaySelector::Lifetime => f.write_str("lifetime"),
            DaySelector::DaysAgo(n) => write!(f, "{n}"),
        }
    }
}

struct Inner {
    daily: DailyStore,
    lifetime: LifetimeStore,
    time_source: TimeSource,
}

/// Shared handle over a [`DailyStore`] and a [`LifetimeStore`].
///
/// Cloning is cheap; clones see the same stores.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("window", &self.inner.daily.window())
            .field("series", &self.inner.lifetime.len())
            .field("time_source", &self.inner.time_source)
            .finish()
    }
}

impl Monitor {
    /// Creates a monitor with a `window`-day ring. "Today" is taken from `time_source`.
    ///
    /// # Panics
    ///
    /// Panics if `window` is 0.
    pub fn new(window: usize, time_source: TimeSource) -> Self {
        Self {
            inner: Arc::new(Inner {
                daily: DailyStore::new(window),
                lifetime: LifetimeStore::new(),
                time_source,
            }),
        }
    }

    /// The windowed store.
    pub fn daily(&self) -> &DailyStore {
        &self.inner.daily
    }

    /// The lifetime store.
    pub fn lifetime(&self) -> &LifetimeStore {
        &self.inner.lifetime
    }

    /// The clock queries resolve "today" against.
    pub fn time_source(&self) -> &TimeSource {
        &self.inner.time_source
    }

    /// The current day.
    pub fn today(&self) -> Day {
        Day::today(&self.inner.time_source)
    }

    /// Feeds `metric` to both stores. The stores update independently, so a conflict in one
    /// does not prevent the other from taking the metric.
    pub fn dispatch(&self, metric: &Metric) -> Routed {
        let routed = self.inner.daily.handle(metric);
        match &routed {
            Routed::Rolled { evicted } => {
                debug!(day = %metric.day, evicted = ?evicted, "started a new daily bucket")
            }
            Routed::Stale => daystat_core::rate_limited!(
                WARN_INTERVAL,
                warn!(day = %metric.day, labels = %metric.labels, "dropping metric for a day outside the window")
            ),
            Routed::Reset | Routed::Backfilled { reset: true, .. } => daystat_core::rate_limited!(
                WARN_INTERVAL,
                warn!(day = %metric.day, labels = %metric.labels, "daily counter overflowed and was reset")
            ),
            Routed::Backfilled {
                evicted: Some(evicted),
                ..
            } => {
                debug!(day = %metric.day, %evicted, "started a bucket for a late day")
            }
            Routed::Conflict(conflict) => daystat_core::rate_limited!(
                WARN_INTERVAL,
                warn!(%conflict, "dropping metric from daily bucket")
            ),
            Routed::Inserted | Routed::Merged | Routed::Backfilled { .. } => {
                trace!(day = %metric.day, labels = %metric.labels, ?routed, "routed metric")
            }
        }

        match self.inner.lifetime.handle(metric) {
            Ok(Absorbed::Inserted | Absorbed::Merged) => {}
            Ok(Absorbed::Reset) => daystat_core::rate_limited!(
                WARN_INTERVAL,
                warn!(labels = %metric.labels, "lifetime counter overflowed and was reset")
            ),
            Err(conflict) => daystat_core::rate_limited!(
                WARN_INTERVAL,
                warn!(%conflict, "dropping metric from lifetime family")
            ),
        }
        routed
    }

    /// Label discovery over the lifetime family.
    ///
    /// With both thresholds at zero this returns every label seen. Otherwise it returns the
    /// labels of entries whose [`MetricValue::MaxGauge`] exceeds `max_latency` or whose
    /// [`MetricValue::MinGauge`] is below `min_latency`, leaving out label names that contain
    /// `api`.
    ///
    /// The result is sorted and free of duplicates.
    pub fn labels(&self, max_latency: u64, min_latency: u64) -> Vec<Label> {
        let mut labels: Vec<Label> = self.inner.lifetime.inspect(|family| {
            if max_latency == 0 && min_latency == 0 {
                return family
                    .metrics
                    .iter()
                    .flat_map(|metric| metric.labels.iter().cloned())
                    .collect();
            }
            family
                .metrics
                .iter()
                .filter(|metric| match metric.value {
                    MetricValue::MaxGauge(v) => v > max_latency,
                    MetricValue::MinGauge(v) => v < min_latency,
                    _ => false,
                })
                .flat_map(|metric| metric.labels.iter())
                .filter(|label| !label.name.contains(SERIES_NAME_FRAGMENT))
                .cloned()
                .collect()
        });
        labels.sort();
        labels.dedup();
        labels
    }

    /// Resolves each selector to a family snapshot, in order. When `predicates` is non-empty,
    /// entries whose labels match none of them are removed.
    pub fn filter(&self, days: &[DaySelector], predicates: &[Label]) -> Vec<MetricFamily> {
        let today = self.today();
        days.iter()
            .map(|selector| {
                let mut family = match *selector {
                    DaySelector::Lifetime => self.inner.lifetime.snapshot(),
                    DaySelector::DaysAgo(n) => self.inner.daily.get_by_index(n, today),
                };
                if !predicates.is_empty() {
                    family.retain(|metric| metric.labels.more(predicates));
                }
                family
            })
            .collect()
    }
}
