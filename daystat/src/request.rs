// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-endpoint request instruments.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use daystat_aggregation::query::{SERIES_LABEL, STAT_LABEL, stat};
use daystat_core::{CollectSink, Counter, Label, Labels, MaxGauge, MinGauge};

/// The four request series for one endpoint.
///
/// Every series carries `api=<endpoint>` and `api_metric=<statistic>`, which is what
/// [`top_n`](daystat_aggregation::query::top_n) groups and classifies by. Latencies are recorded
/// in whole milliseconds.
#[derive(Clone, Debug)]
pub struct RequestRecorder {
    count: Counter,
    total_latency: Counter,
    max_latency: MaxGauge,
    min_latency: MinGauge,
}

impl RequestRecorder {
    /// Instruments for `api` that collect into `sink`.
    pub fn new(api: impl Into<String>, sink: Arc<dyn CollectSink>) -> Self {
        Self::with_labels(Labels::new([Label::new(SERIES_LABEL, api)]), sink)
    }

    /// Instruments for an arbitrary base label set, which should include [`SERIES_LABEL`].
    pub fn with_labels(base: Labels, sink: Arc<dyn CollectSink>) -> Self {
        let series = |name: &str| base.with(&[Label::new(STAT_LABEL, name)]);
        Self {
            count: Counter::new(series(stat::REQUEST_COUNT), sink.clone()),
            total_latency: Counter::new(series(stat::REQUEST_TOTAL_LATENCY), sink.clone()),
            max_latency: MaxGauge::new(series(stat::MAX_LATENCY), sink.clone()),
            min_latency: MinGauge::new(series(stat::MIN_LATENCY), sink),
        }
    }

    /// A recorder whose series also carry `extra`, with fresh state.
    ///
    /// Overriding [`STAT_LABEL`] through `extra` would collapse the four series into one, so it
    /// is ignored.
    pub fn with(&self, extra: &[Label]) -> Self {
        let extra: Vec<Label> = extra
            .iter()
            .filter(|label| label.name != STAT_LABEL)
            .cloned()
            .collect();
        Self {
            count: self.count.with(&extra),
            total_latency: self.total_latency.with(&extra),
            max_latency: self.max_latency.with(&extra),
            min_latency: self.min_latency.with(&extra),
        }
    }

    /// Record one request that took `latency`.
    pub fn record(&self, latency: Duration) {
        self.record_millis(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
    }

    /// Record one request that took `millis` milliseconds.
    pub fn record_millis(&self, millis: u64) {
        self.count.inc();
        self.total_latency.add(millis);
        self.max_latency.observe(millis);
        self.min_latency.observe(millis);
    }

    /// Start timing a request. The request is recorded when the guard is finished or dropped.
    pub fn start(&self) -> RequestTimer<'_> {
        RequestTimer {
            recorder: self,
            started: Instant::now(),
            done: false,
        }
    }
}

/// Records the elapsed time into its [`RequestRecorder`] when dropped.
#[must_use = "the request is recorded when this guard is dropped"]
#[derive(Debug)]
pub struct RequestTimer<'a> {
    recorder: &'a RequestRecorder,
    started: Instant,
    done: bool,
}

impl RequestTimer<'_> {
    /// Record now and return the measured latency.
    pub fn finish(mut self) -> Duration {
        self.record()
    }

    /// Drop without recording anything.
    pub fn discard(mut self) {
        self.done = true;
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.done {
            self.done = true;
            self.recorder.record(elapsed);
        }
        elapsed
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        self.record();
    }
}
