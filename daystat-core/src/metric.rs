// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The metric value model: day numbers, the four metric kinds, merged entries and families.

use std::fmt;

use daystat_timesource::TimeSource;
use serde::{Deserialize, Serialize};

use crate::{KindMismatch, Labels};

/// A UTC day number, i.e. whole days since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Day(pub i64);

impl Day {
    /// The current day according to `time_source`.
    pub fn today(time_source: &TimeSource) -> Day {
        Day(time_source.today())
    }

    /// Resolves a days-ago offset against `self` as "today". `1` is today, `2` yesterday, and
    /// `0` is tomorrow, which never matches a stored bucket.
    pub fn days_ago(self, n: u32) -> Day {
        Day(self.0 - i64::from(n) + 1)
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The kind of a [`MetricValue`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Summed on merge.
    Counter,
    /// Last write wins.
    Gauge,
    /// Running maximum.
    MaxGauge,
    /// Running minimum.
    MinGauge,
}

/// A single metric observation. Exactly one kind is populated by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    /// A monotonically accumulated count.
    Counter(u64),
    /// A point-in-time value.
    Gauge(u64),
    /// The largest value observed.
    MaxGauge(u64),
    /// The smallest value observed.
    MinGauge(u64),
}

/// How a [`MetricValue::merge`] updated the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Merged {
    /// The values were combined according to their kind.
    Combined,
    /// A counter addition overflowed and the destination was reset to empty.
    Reset,
}

impl MetricValue {
    /// The empty value of `kind`: zero for everything except [`MetricKind::MinGauge`], which
    /// starts at `u64::MAX` so that the first observation always wins.
    pub fn empty(kind: MetricKind) -> MetricValue {
        match kind {
            MetricKind::Counter => MetricValue::Counter(0),
            MetricKind::Gauge => MetricValue::Gauge(0),
            MetricKind::MaxGauge => MetricValue::MaxGauge(0),
            MetricKind::MinGauge => MetricValue::MinGauge(u64::MAX),
        }
    }

    /// The kind of this value.
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::MaxGauge(_) => MetricKind::MaxGauge,
            MetricValue::MinGauge(_) => MetricKind::MinGauge,
        }
    }

    /// The raw payload.
    pub fn get(&self) -> u64 {
        match *self {
            MetricValue::Counter(v)
            | MetricValue::Gauge(v)
            | MetricValue::MaxGauge(v)
            | MetricValue::MinGauge(v) => v,
        }
    }

    /// Merges `other` into `self`.
    ///
    /// Counters add. An addition that would overflow resets `self` to zero instead of
    /// saturating, so the observation and everything accumulated before it are lost. Gauges
    /// keep `other`, max gauges keep the larger value and min gauges the smaller one.
    ///
    /// Returns `other` back if it is a different kind.
    pub fn merge(&mut self, other: MetricValue) -> Result<Merged, MetricValue> {
        match (self, other) {
            (MetricValue::Counter(dst), MetricValue::Counter(src)) => match dst.checked_add(src) {
                Some(sum) => {
                    *dst = sum;
                    Ok(Merged::Combined)
                }
                None => {
                    *dst = 0;
                    Ok(Merged::Reset)
                }
            },
            (MetricValue::Gauge(dst), MetricValue::Gauge(src)) => {
                *dst = src;
                Ok(Merged::Combined)
            }
            (MetricValue::MaxGauge(dst), MetricValue::MaxGauge(src)) => {
                *dst = (*dst).max(src);
                Ok(Merged::Combined)
            }
            (MetricValue::MinGauge(dst), MetricValue::MinGauge(src)) => {
                *dst = (*dst).min(src);
                Ok(Merged::Combined)
            }
            (_, other) => Err(other),
        }
    }
}

/// One aggregated series entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// The label set identifying the series.
    pub labels: Labels,
    /// The day the entry belongs to. Set on first insert and never overwritten by merges.
    pub day: Day,
    /// The aggregated value.
    #[serde(flatten)]
    pub value: MetricValue,
}

impl Metric {
    /// Creates a new entry.
    pub fn new(labels: Labels, day: Day, value: MetricValue) -> Self {
        Self { labels, day, value }
    }

    /// Merges the value of `other` into this entry. The labels and day of `self` are kept.
    pub fn merge(&mut self, other: &Metric) -> Result<Merged, KindMismatch> {
        self.value
            .merge(other.value)
            .map_err(|incoming| KindMismatch {
                labels: self.labels.clone(),
                existing: self.value.kind(),
                incoming: incoming.kind(),
            })
    }
}

/// What [`MetricFamily::absorb`] did with an incoming entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Absorbed {
    /// No entry had the same labels, a clone was appended.
    Inserted,
    /// Merged into the entry with the same labels.
    Merged,
    /// Merged into the entry with the same labels, and a counter overflow reset it.
    Reset,
}

/// A named collection of already merged entries for one time segment.
///
/// Entries are unique by label set and kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFamily {
    /// Name of the segment, e.g. `daily` or `lifetime`.
    pub name: String,
    /// The day this family covers, `None` for the lifetime family.
    pub day: Option<Day>,
    /// The merged entries.
    pub metrics: Vec<Metric>,
}

impl MetricFamily {
    /// Creates an empty family.
    pub fn new(name: impl Into<String>, day: Option<Day>) -> Self {
        Self {
            name: name.into(),
            day,
            metrics: Vec::new(),
        }
    }

    /// Returns `true` if this family holds no entries.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// The entry with exactly these labels, if any.
    pub fn get(&self, labels: &Labels) -> Option<&Metric> {
        self.metrics.iter().find(|metric| &metric.labels == labels)
    }

    /// Merges `metric` into the entry with equal labels, or appends a clone of it.
    pub fn absorb(&mut self, metric: &Metric) -> Result<Absorbed, KindMismatch> {
        match self
            .metrics
            .iter_mut()
            .find(|existing| existing.labels == metric.labels)
        {
            Some(existing) => Ok(match existing.merge(metric)? {
                Merged::Combined => Absorbed::Merged,
                Merged::Reset => Absorbed::Reset,
            }),
            None => {
                self.metrics.push(metric.clone());
                Ok(Absorbed::Inserted)
            }
        }
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, keep: impl FnMut(&Metric) -> bool) {
        self.metrics.retain(keep);
    }
}
