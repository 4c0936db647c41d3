// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Producer-side contracts.
//!
//! An instrument is a [`Collector`]: when it changes, it hands a [`Writer`] for itself to a
//! [`CollectSink`] (normally the ingestion queue). Later, a worker gives that Writer a fresh
//! [`Snapshot`] stamped with the current day, and the Writer fills in labels and exactly one value.

use std::sync::Arc;

use crate::{Day, Labels, Metric, MetricValue, WriteError};

/// Materializes the pending state of an instrument into a [`Snapshot`].
pub trait Writer: Send + Sync {
    /// Sets labels and a value on `snapshot`.
    ///
    /// Returns [`WriteError::Empty`] when there is nothing pending.
    fn write(&self, snapshot: &mut Snapshot) -> Result<(), WriteError>;
}

/// Receives Writers pushed by [`Collector`]s.
pub trait CollectSink: Send + Sync {
    /// Accept a Writer for later materialization. Must not block.
    fn accept(&self, writer: Arc<dyn Writer>);
}

impl<T: CollectSink + ?Sized> CollectSink for Arc<T> {
    fn accept(&self, writer: Arc<dyn Writer>) {
        (**self).accept(writer)
    }
}

/// Something that can push itself into a [`CollectSink`].
pub trait Collector {
    /// Push a Writer for the current state into `sink`.
    fn collect(&self, sink: &dyn CollectSink);
}

/// A metric under construction.
#[derive(Debug)]
pub struct Snapshot {
    day: Day,
    labels: Labels,
    value: Option<MetricValue>,
}

impl Snapshot {
    /// A fresh snapshot for `day` with no labels and no value.
    pub fn new(day: Day) -> Self {
        Self {
            day,
            labels: Labels::default(),
            value: None,
        }
    }

    /// The day this snapshot will be filed under.
    pub fn day(&self) -> Day {
        self.day
    }

    /// Replaces the labels.
    pub fn set_labels(&mut self, labels: Labels) {
        self.labels = labels;
    }

    /// Sets the value. A snapshot holds exactly one value, so a second call fails with
    /// [`WriteError::AlreadySet`].
    pub fn set_value(&mut self, value: MetricValue) -> Result<(), WriteError> {
        if self.value.is_some() {
            return Err(WriteError::AlreadySet);
        }
        self.value = Some(value);
        Ok(())
    }

    /// Validates the snapshot and turns it into a [`Metric`].
    pub fn finish(self) -> Result<Metric, WriteError> {
        let value = self.value.ok_or(WriteError::Empty)?;
        Ok(Metric::new(self.labels, self.day, value))
    }
}

/// Runs `writer` against a fresh snapshot for `day`.
pub fn materialize(writer: &dyn Writer, day: Day) -> Result<Metric, WriteError> {
    let mut snapshot = Snapshot::new(day);
    writer.write(&mut snapshot)?;
    snapshot.finish()
}

/// Helpers for testing instruments without a pipeline.
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use std::sync::{Arc, Mutex, PoisonError};

    use crate::{CollectSink, Day, Metric, WriteError, Writer};

    /// A sink that keeps every Writer it is given.
    #[derive(Default)]
    pub struct CapturingSink {
        writers: Mutex<Vec<Arc<dyn Writer>>>,
    }

    impl CapturingSink {
        /// Creates an empty sink.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Number of Writers accepted and not yet drained.
        pub fn pending(&self) -> usize {
            self.writers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }

        /// Materializes every captured Writer in arrival order, as a pipeline worker would.
        pub fn drain(&self, day: Day) -> Vec<Result<Metric, WriteError>> {
            let writers = std::mem::take(
                &mut *self.writers.lock().unwrap_or_else(PoisonError::into_inner),
            );
            writers
                .iter()
                .map(|writer| crate::materialize(writer.as_ref(), day))
                .collect()
        }

        /// Like [`drain`](Self::drain) but keeps only the successful metrics.
        pub fn drain_ok(&self, day: Day) -> Vec<Metric> {
            self.drain(day).into_iter().filter_map(Result::ok).collect()
        }
    }

    impl CollectSink for CapturingSink {
        fn accept(&self, writer: Arc<dyn Writer>) {
            self.writers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(writer);
        }
    }
}
