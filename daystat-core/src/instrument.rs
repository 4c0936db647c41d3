// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Atomic instruments.
//!
//! Each instrument owns a label set and one atomic cell. Mutators update the cell and then
//! collect the instrument into the sink it was created with. When a worker later runs the
//! Writer, the pending state is taken out of the cell:
//!
//! | instrument | mutator | taken as |
//! |---|---|---|
//! | [`Counter`] | [`inc`](Counter::inc), [`add`](Counter::add) | delta since the last write, reset to 0 |
//! | [`Gauge`] | [`set`](Gauge::set) | current value |
//! | [`MaxGauge`] | [`observe`](MaxGauge::observe) | max since the last write, reset to 0 |
//! | [`MinGauge`] | [`observe`](MinGauge::observe) | min since the last write, reset to `u64::MAX` |
//!
//! A max of 0 or a min of `u64::MAX` is the reset value itself and is never reported.
//!
//! Since every mutation enqueues a Writer but a single write drains everything pending, most
//! Writers of a busy instrument find nothing to do and report [`WriteError::Empty`].

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use crate::{CollectSink, Collector, Label, Labels, MetricValue, Snapshot, WriteError, Writer};

trait Cell: Default + Send + Sync + 'static {
    fn take(&self) -> Option<MetricValue>;
}

#[derive(Default)]
struct CounterCell {
    pending: AtomicU64,
}

impl Cell for CounterCell {
    fn take(&self) -> Option<MetricValue> {
        match self.pending.swap(0, Ordering::AcqRel) {
            0 => None,
            delta => Some(MetricValue::Counter(delta)),
        }
    }
}

#[derive(Default)]
struct GaugeCell {
    value: AtomicU64,
    dirty: AtomicBool,
}

impl Cell for GaugeCell {
    fn take(&self) -> Option<MetricValue> {
        self.dirty
            .swap(false, Ordering::AcqRel)
            .then(|| MetricValue::Gauge(self.value.load(Ordering::Acquire)))
    }
}

struct ExtremeCell {
    value: AtomicU64,
    dirty: AtomicBool,
}

impl ExtremeCell {
    const fn starting_at(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
            dirty: AtomicBool::new(false),
        }
    }
}

#[derive(Default)]
struct MaxCell(ExtremeCell);

impl Default for ExtremeCell {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl Cell for MaxCell {
    fn take(&self) -> Option<MetricValue> {
        if !self.0.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        // an observe landing between the two swaps raises the flag again after its value was
        // already taken here; the next take then finds 0 and has nothing to report
        match self.0.value.swap(0, Ordering::AcqRel) {
            0 => None,
            value => Some(MetricValue::MaxGauge(value)),
        }
    }
}

struct MinCell(ExtremeCell);

impl Default for MinCell {
    fn default() -> Self {
        Self(ExtremeCell::starting_at(u64::MAX))
    }
}

impl Cell for MinCell {
    fn take(&self) -> Option<MetricValue> {
        if !self.0.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        // an observe that set the flag but has not stored its value yet is picked up next time
        match self.0.value.swap(u64::MAX, Ordering::AcqRel) {
            u64::MAX => None,
            value => Some(MetricValue::MinGauge(value)),
        }
    }
}

struct Series<C> {
    labels: Labels,
    cell: C,
}

impl<C: Cell> Writer for Series<C> {
    fn write(&self, snapshot: &mut Snapshot) -> Result<(), WriteError> {
        let value = self.cell.take().ok_or(WriteError::Empty)?;
        snapshot.set_labels(self.labels.clone());
        snapshot.set_value(value)
    }
}

macro_rules! instrument {
    ($(#[$attr:meta])* $name:ident, cell: $cell:ty) => {
        $(#[$attr])*
        #[derive(Clone)]
        pub struct $name {
            series: Arc<Series<$cell>>,
            sink: Arc<dyn CollectSink>,
        }

        impl $name {
            /// Creates an instrument for `labels` that collects into `sink` on every change.
            pub fn new(labels: Labels, sink: Arc<dyn CollectSink>) -> Self {
                Self {
                    series: Arc::new(Series {
                        labels,
                        cell: <$cell>::default(),
                    }),
                    sink,
                }
            }

            /// The labels this instrument reports under.
            pub fn labels(&self) -> &Labels {
                &self.series.labels
            }

            /// A new instrument whose labels are this one's overlaid with `extra`.
            ///
            /// The derived instrument starts with empty state and shares only the sink. The
            /// original is untouched.
            pub fn with(&self, extra: &[Label]) -> Self {
                Self::new(self.series.labels.with(extra), self.sink.clone())
            }

            fn publish(&self) {
                self.collect(self.sink.as_ref());
            }
        }

        impl Collector for $name {
            fn collect(&self, sink: &dyn CollectSink) {
                sink.accept(self.series.clone());
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("labels", &self.series.labels)
                    .finish_non_exhaustive()
            }
        }
    };
}

instrument!(
    /// A counter. Each write reports the delta accumulated since the previous write.
    Counter, cell: CounterCell
);

instrument!(
    /// A last-write-wins gauge.
    Gauge, cell: GaugeCell
);

instrument!(
    /// Tracks the largest observation.
    MaxGauge, cell: MaxCell
);

instrument!(
    /// Tracks the smallest observation.
    MinGauge, cell: MinCell
);

impl Counter {
    /// Add 1 to this counter.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Increase the value of this counter by `n`. The pending delta saturates at `u64::MAX`.
    pub fn add(&self, n: u64) {
        let _ = self
            .series
            .cell
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                Some(pending.saturating_add(n))
            });
        self.publish();
    }
}

impl Gauge {
    /// Set the gauge to `value`.
    pub fn set(&self, value: u64) {
        let cell = &self.series.cell;
        cell.value.store(value, Ordering::Release);
        cell.dirty.store(true, Ordering::Release);
        self.publish();
    }
}

impl MaxGauge {
    /// Record `value`; the gauge keeps the largest one.
    pub fn observe(&self, value: u64) {
        let cell = &self.series.cell.0;
        cell.value.fetch_max(value, Ordering::AcqRel);
        cell.dirty.store(true, Ordering::Release);
        self.publish();
    }
}

impl MinGauge {
    /// Record `value`; the gauge keeps the smallest one.
    pub fn observe(&self, value: u64) {
        let cell = &self.series.cell.0;
        cell.value.fetch_min(value, Ordering::AcqRel);
        cell.dirty.store(true, Ordering::Release);
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;
    use crate::{Day, Metric, collect::test_util::CapturingSink, labels};

    const DAY: Day = Day(19_388);

    fn values(metrics: &[Metric]) -> Vec<MetricValue> {
        metrics.iter().map(|m| m.value).collect()
    }

    #[test]
    fn counter_reports_delta_once() {
        let sink = CapturingSink::new();
        let counter = Counter::new(labels!["api" => "/x"], sink.clone());
        counter.inc();
        counter.inc();
        counter.add(3);
        check!(sink.pending() == 3);

        let results = sink.drain(DAY);
        check!(results[0].as_ref().map(|m| m.value) == Ok(MetricValue::Counter(5)));
        check!(results[1] == Err(WriteError::Empty));
        check!(results[2] == Err(WriteError::Empty));

        counter.inc();
        check!(values(&sink.drain_ok(DAY)) == [MetricValue::Counter(1)]);
    }

    #[test]
    fn gauge_reports_latest() {
        let sink = CapturingSink::new();
        let gauge = Gauge::new(labels!["api" => "/x"], sink.clone());
        gauge.set(10);
        gauge.set(4);
        check!(values(&sink.drain_ok(DAY)) == [MetricValue::Gauge(4)]);
    }

    #[test]
    fn max_gauge_resets_after_write() {
        let sink = CapturingSink::new();
        let max = MaxGauge::new(labels!["api" => "/x"], sink.clone());
        max.observe(10);
        max.observe(30);
        max.observe(20);
        check!(values(&sink.drain_ok(DAY)) == [MetricValue::MaxGauge(30)]);
        max.observe(5);
        check!(values(&sink.drain_ok(DAY)) == [MetricValue::MaxGauge(5)]);
    }

    #[test]
    fn min_gauge_resets_after_write() {
        let sink = CapturingSink::new();
        let min = MinGauge::new(labels!["api" => "/x"], sink.clone());
        min.observe(10);
        min.observe(3);
        min.observe(20);
        check!(values(&sink.drain_ok(DAY)) == [MetricValue::MinGauge(3)]);
        min.observe(50);
        check!(values(&sink.drain_ok(DAY)) == [MetricValue::MinGauge(50)]);
    }

    #[test]
    fn min_gauge_accepts_zero() {
        let sink = CapturingSink::new();
        let min = MinGauge::new(labels!["api" => "/x"], sink.clone());
        min.observe(0);
        check!(values(&sink.drain_ok(DAY)) == [MetricValue::MinGauge(0)]);
    }

    #[test]
    fn raised_flag_without_value_reports_nothing() {
        // the state left behind when an observe races with a write
        let max = MaxCell::default();
        max.0.dirty.store(true, Ordering::Release);
        check!(max.take() == None);
        check!(max.take() == None);

        let min = MinCell::default();
        min.0.dirty.store(true, Ordering::Release);
        check!(min.take() == None);
    }

    #[test]
    fn max_gauge_of_zero_is_not_reported() {
        let sink = CapturingSink::new();
        let max = MaxGauge::new(labels!["api" => "/x"], sink.clone());
        max.observe(0);
        check!(sink.drain(DAY) == [Err(WriteError::Empty)]);
    }

    #[test]
    fn with_derives_independent_instrument() {
        let sink = CapturingSink::new();
        let base = Counter::new(labels!["path" => "/x", "method" => "GET"], sink.clone());
        let derived = base.with(&[Label::new("method", "POST")]);
        check!(base.labels() == &labels!["path" => "/x", "method" => "GET"]);
        check!(derived.labels() == &labels!["path" => "/x", "method" => "POST"]);

        derived.add(2);
        base.inc();
        let metrics = sink.drain_ok(DAY);
        check!(metrics.len() == 2);
        check!(metrics[0].labels == labels!["path" => "/x", "method" => "POST"]);
        check!(metrics[0].value == MetricValue::Counter(2));
        check!(metrics[1].value == MetricValue::Counter(1));
    }

    #[test]
    fn collect_pushes_into_given_sink() {
        let own = CapturingSink::new();
        let other = CapturingSink::new();
        let gauge = Gauge::new(labels!["api" => "/x"], own.clone());
        gauge.set(1);
        gauge.collect(other.as_ref());
        check!(own.pending() == 1);
        check!(other.pending() == 1);
        // the first write drains the shared state, the second has nothing left
        check!(values(&own.drain_ok(DAY)) == [MetricValue::Gauge(1)]);
        check!(other.drain(DAY) == [Err(WriteError::Empty)]);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let sink = CapturingSink::new();
        let counter = Counter::new(labels!["api" => "/x"], sink.clone());
        std::thread::scope(|s| {
            for _ in 0..4 {
                let counter = counter.clone();
                s.spawn(move || {
                    for _ in 0..250 {
                        counter.inc();
                    }
                });
            }
        });
        let total: u64 = sink.drain_ok(DAY).iter().map(|m| m.value.get()).sum();
        check!(total == 1_000);
    }
}
