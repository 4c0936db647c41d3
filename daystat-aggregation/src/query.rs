// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Request statistics over aggregated families, and top-N ranking.
//!
//! Request series are identified by two labels: [`SERIES_LABEL`] names the endpoint and
//! [`STAT_LABEL`] names the statistic the entry holds (see [`stat`]). An entry without a
//! statistic label still counts as a max or min latency if it is a max or min gauge.

use std::{fmt, str::FromStr};

use daystat_core::{Day, Metric, MetricFamily, MetricValue, ParseError};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Label whose value discriminates request series, normally the endpoint.
pub const SERIES_LABEL: &str = "api";

/// Label whose value names the statistic an entry holds.
pub const STAT_LABEL: &str = "api_metric";

/// Values of [`STAT_LABEL`].
pub mod stat {
    /// Number of requests.
    pub const REQUEST_COUNT: &str = "request_count";
    /// Sum of request latencies.
    pub const REQUEST_TOTAL_LATENCY: &str = "request_total_latency";
    /// Largest request latency.
    pub const MAX_LATENCY: &str = "max_latency";
    /// Smallest request latency.
    pub const MIN_LATENCY: &str = "min_latency";
}

/// The statistic [`top_n`] ranks by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    /// Largest latency.
    Max,
    /// Smallest latency.
    Min,
    /// Total latency divided by request count.
    Average,
    /// Request count.
    Count,
}

impl FromStr for RankBy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(RankBy::Max),
            "min" => Ok(RankBy::Min),
            "average" | "avg" => Ok(RankBy::Average),
            "count" => Ok(RankBy::Count),
            _ => Err(ParseError::RankBy(s.to_owned())),
        }
    }
}

impl fmt::Display for RankBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RankBy::Max => "max",
            RankBy::Min => "min",
            RankBy::Average => "average",
            RankBy::Count => "count",
        })
    }
}

/// Request statistics for one series on one day (or the lifetime).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Value of [`SERIES_LABEL`], if the entries carried one.
    pub api: Option<String>,
    /// Day of the family the entries came from; `None` for the lifetime family.
    pub day: Option<Day>,
    /// Sum of request counts.
    pub request_count: u64,
    /// Sum of request latencies.
    pub request_total_latency: u64,
    /// Largest latency.
    pub max_latency: u64,
    /// Smallest latency, 0 if none was recorded.
    pub min_latency: u64,
    /// `request_total_latency / request_count`, 0 if there were no requests.
    pub average_latency: u64,
}

impl Summary {
    /// The field selected by `rank_by`.
    pub fn rank(&self, rank_by: RankBy) -> u64 {
        match rank_by {
            RankBy::Max => self.max_latency,
            RankBy::Min => self.min_latency,
            RankBy::Average => self.average_latency,
            RankBy::Count => self.request_count,
        }
    }

    /// Zeroes every statistic except the one selected by `rank_by`.
    pub fn keep_only(&mut self, rank_by: RankBy) {
        let kept = self.rank(rank_by);
        self.request_count = 0;
        self.request_total_latency = 0;
        self.max_latency = 0;
        self.min_latency = 0;
        self.average_latency = 0;
        match rank_by {
            RankBy::Max => self.max_latency = kept,
            RankBy::Min => self.min_latency = kept,
            RankBy::Average => self.average_latency = kept,
            RankBy::Count => self.request_count = kept,
        }
    }
}

#[derive(Clone, Copy)]
enum Stat {
    Count,
    TotalLatency,
    MaxLatency,
    MinLatency,
}

fn classify(metric: &Metric) -> Option<Stat> {
    match metric.labels.get(STAT_LABEL) {
        Some(stat::REQUEST_COUNT) => Some(Stat::Count),
        Some(stat::REQUEST_TOTAL_LATENCY) => Some(Stat::TotalLatency),
        Some(stat::MAX_LATENCY) => Some(Stat::MaxLatency),
        Some(stat::MIN_LATENCY) => Some(Stat::MinLatency),
        _ => match metric.value {
            MetricValue::MaxGauge(_) => Some(Stat::MaxLatency),
            MetricValue::MinGauge(_) => Some(Stat::MinLatency),
            MetricValue::Counter(_) | MetricValue::Gauge(_) => None,
        },
    }
}

#[derive(Default)]
struct Tally {
    count: u64,
    total: u64,
    max: u64,
    min: Option<u64>,
}

impl Tally {
    fn add(&mut self, metric: &Metric) {
        let v = metric.value.get();
        match classify(metric) {
            Some(Stat::Count) => self.count = self.count.saturating_add(v),
            Some(Stat::TotalLatency) => self.total = self.total.saturating_add(v),
            Some(Stat::MaxLatency) => self.max = self.max.max(v),
            Some(Stat::MinLatency) => self.min = Some(self.min.map_or(v, |min| min.min(v))),
            None => {}
        }
    }

    fn into_summary(self, api: Option<String>, day: Option<Day>) -> Summary {
        Summary {
            api,
            day,
            request_count: self.count,
            request_total_latency: self.total,
            max_latency: self.max,
            min_latency: self.min.unwrap_or(0),
            average_latency: self.total.checked_div(self.count).unwrap_or(0),
        }
    }
}

/// All request statistics of one family, across every series in it.
pub fn summarize(family: &MetricFamily) -> Summary {
    let mut tally = Tally::default();
    for metric in &family.metrics {
        tally.add(metric);
    }
    tally.into_summary(None, family.day)
}

/// Groups entries by ([`SERIES_LABEL`] value, family day), ranks the groups in descending order
/// of `rank_by` and keeps the first `n` (all of them when `n` is 0).
///
/// Groups that tie keep the order they were first encountered in. Every statistic other than
/// the ranked one is zeroed in the result.
pub fn top_n(families: &[MetricFamily], rank_by: RankBy, n: usize) -> Vec<Summary> {
    let mut index: HashMap<(Option<&str>, Option<Day>), usize> = HashMap::new();
    let mut groups: Vec<((Option<&str>, Option<Day>), Tally)> = Vec::new();

    for family in families {
        for metric in &family.metrics {
            let key = (metric.labels.get(SERIES_LABEL), family.day);
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push((key, Tally::default()));
                groups.len() - 1
            });
            groups[slot].1.add(metric);
        }
    }

    let mut ranked: Vec<Summary> = groups
        .into_iter()
        .map(|((api, day), tally)| tally.into_summary(api.map(str::to_owned), day))
        .collect();
    // stable, so ties keep encounter order
    ranked.sort_by(|a, b| b.rank(rank_by).cmp(&a.rank(rank_by)));
    if n > 0 {
        ranked.truncate(n);
    }
    for summary in &mut ranked {
        summary.keep_only(rank_by);
    }
    ranked
}
