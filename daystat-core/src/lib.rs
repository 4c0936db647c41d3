// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the `daystat` set of libraries: labels, the metric value model, and the
//! Collector/Writer contracts through which instruments feed the ingestion pipeline.
//!
//! Generally, you should not depend on this crate directly. Instead, use `daystat`.

mod collect;
mod error;
mod instrument;
mod label;
mod metric;
#[doc(hidden)]
pub mod rate_limit;

pub use collect::{CollectSink, Collector, Snapshot, Writer, materialize};
pub use error::{KindMismatch, ParseError, WriteError};
pub use instrument::{Counter, Gauge, MaxGauge, MinGauge};
pub use label::{Label, Labels, WILDCARD, merge_labels};
pub use metric::{Absorbed, Day, Merged, Metric, MetricFamily, MetricKind, MetricValue};

#[cfg(any(test, feature = "test-util"))]
pub use collect::test_util;
