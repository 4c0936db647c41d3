// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! In-process, per-day request metrics.
//!
//! An [`Engine`] owns a rolling window of per-day aggregation buckets, a lifetime accumulator and
//! the worker pool that feeds them. Instruments created from the engine push themselves into
//! its ingestion queue whenever they change; queries read consistent snapshots of the buckets.
//!
//! ```
//! use daystat::{Config, DaySelector, Engine, RankBy};
//!
//! let (engine, join) = Engine::new(&Config::default()).unwrap();
//! let users = engine.request_recorder("/users");
//! users.record_millis(12);
//! users.record_millis(30);
//! engine.flush();
//!
//! let top = engine.top_n(&[DaySelector::TODAY], &[], RankBy::Max, 10);
//! assert_eq!(top[0].api.as_deref(), Some("/users"));
//! assert_eq!(top[0].max_latency, 30);
//! join.shut_down();
//! ```

mod config;
mod error;
mod params;
mod pipeline;
mod request;

use std::sync::Arc;

pub use config::{Config, MAX_WORKERS};
pub use daystat_aggregation::{
    DailyStore, DaySelector, LifetimeStore, Monitor, Routed,
    query::{self, RankBy, Summary},
};
pub use daystat_core::{
    CollectSink, Collector, Counter, Day, Gauge, Label, Labels, MaxGauge, Metric, MetricFamily,
    MetricKind, MetricValue, MinGauge, ParseError, Snapshot, WriteError, Writer, labels,
};
pub use daystat_timesource::TimeSource;
pub use error::{BuildError, ConfigError, IngestError};
pub use params::QueryParams;
pub use pipeline::{OverflowPolicy, Pipeline, PipelineBuilder, PipelineJoinHandle};
pub use request::{RequestRecorder, RequestTimer};

/// Fake clocks and a capturing sink for testing code that records into daystat.
///
/// To enable this module, you must enable the `test-util` feature.
#[cfg(feature = "test-util")]
pub mod test_util {
    pub use daystat_core::test_util::CapturingSink;
    pub use daystat_timesource::fakes::{ManuallyAdvancedTimeSource, StaticTimeSource};
}

/// The single handle through which an application ingests and queries metrics.
///
/// Construct one at startup and pass clones to the ingestion and query call sites. Cloning is
/// cheap and every clone shares the same stores and queue.
#[derive(Clone, Debug)]
pub struct Engine {
    monitor: Monitor,
    pipeline: Pipeline,
}

impl Engine {
    /// Starts an engine that reads the day from the system clock.
    pub fn new(config: &Config) -> Result<(Engine, PipelineJoinHandle), BuildError> {
        Self::with_time_source(config, TimeSource::System)
    }

    /// Starts an engine that reads the day from `time_source`.
    pub fn with_time_source(
        config: &Config,
        time_source: TimeSource,
    ) -> Result<(Engine, PipelineJoinHandle), BuildError> {
        Self::with_pipeline(config.pipeline_builder()?, config.window_days, time_source)
    }

    /// Starts an engine on a custom [`PipelineBuilder`], e.g. one sharing a service-wide
    /// cancellation token.
    ///
    /// # Panics
    ///
    /// Panics if `window_days` is 0.
    pub fn with_pipeline(
        builder: PipelineBuilder,
        window_days: usize,
        time_source: TimeSource,
    ) -> Result<(Engine, PipelineJoinHandle), BuildError> {
        let monitor = Monitor::new(window_days, time_source);
        let (pipeline, join) = builder.build(monitor.clone())?;
        Ok((Engine { monitor, pipeline }, join))
    }

    /// Enqueue `instrument`. Non-blocking and best effort: an observation that does not fit the
    /// queue is handled by the configured [`OverflowPolicy`].
    pub fn ingest(&self, instrument: &dyn Collector) {
        self.pipeline.ingest(instrument);
    }

    /// Family snapshots for `days`, in order, keeping entries that match any of `labels`.
    pub fn query(&self, days: &[DaySelector], labels: &[Label]) -> Vec<MetricFamily> {
        self.monitor.filter(days, labels)
    }

    /// Request statistics over [`query`](Self::query), ranked by `rank_by` and truncated to `n`
    /// (0 keeps all).
    pub fn top_n(
        &self,
        days: &[DaySelector],
        labels: &[Label],
        rank_by: RankBy,
        n: usize,
    ) -> Vec<Summary> {
        query::top_n(&self.query(days, labels), rank_by, n)
    }

    /// [`top_n`](Self::top_n) driven by parsed query parameters.
    pub fn search(&self, params: &QueryParams) -> Vec<Summary> {
        self.top_n(&params.days, &params.labels, params.rank_by, params.n)
    }

    /// Labels seen over the lifetime of the engine. See [`Monitor::labels`] for how the
    /// thresholds narrow the result.
    pub fn discover_labels(&self, max_latency: u64, min_latency: u64) -> Vec<Label> {
        self.monitor.labels(max_latency, min_latency)
    }

    /// Blocks until everything ingested before the call is reflected in queries. Returns `false`
    /// if the pipeline stopped first.
    pub fn flush(&self) -> bool {
        self.pipeline.flush()
    }

    /// A counter reporting into this engine.
    pub fn counter(&self, labels: Labels) -> Counter {
        Counter::new(labels, self.sink())
    }

    /// A gauge reporting into this engine.
    pub fn gauge(&self, labels: Labels) -> Gauge {
        Gauge::new(labels, self.sink())
    }

    /// A max gauge reporting into this engine.
    pub fn max_gauge(&self, labels: Labels) -> MaxGauge {
        MaxGauge::new(labels, self.sink())
    }

    /// A min gauge reporting into this engine.
    pub fn min_gauge(&self, labels: Labels) -> MinGauge {
        MinGauge::new(labels, self.sink())
    }

    /// Request instruments for the endpoint `api`.
    pub fn request_recorder(&self, api: impl Into<String>) -> RequestRecorder {
        RequestRecorder::new(api, self.sink())
    }

    /// The aggregation facade.
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// The ingestion queue.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn sink(&self) -> Arc<dyn CollectSink> {
        Arc::new(self.pipeline.clone())
    }
}
