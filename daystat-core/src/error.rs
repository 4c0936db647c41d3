// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{Labels, MetricKind};

/// Error returned by a [`Writer`](crate::Writer) while filling in a [`Snapshot`](crate::Snapshot).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// The Writer had nothing pending and set no value.
    #[error("writer produced no value")]
    Empty,
    /// The Writer tried to set a second value on the same snapshot.
    #[error("a value was already set on this snapshot")]
    AlreadySet,
    /// Instrument-specific failure.
    #[error("writer rejected the snapshot: {0}")]
    Rejected(String),
}

/// Malformed input at the query boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A label predicate was not of the form `name:value`.
    #[error("invalid label `{0}`, expected `name:value`")]
    Label(String),
    /// A day selector was neither a day count nor the lifetime sentinel.
    #[error("invalid day selector `{0}`, expected a day count or `lifetime`")]
    DaySelector(String),
    /// An unknown ranking key.
    #[error("invalid rank key `{0}`, expected one of max, min, average, count")]
    RankBy(String),
    /// The result count was not a non-negative integer.
    #[error("invalid result count `{0}`")]
    TopN(String),
}

/// Two entries with the same labels carried different metric kinds and could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("metric {labels} is a {existing:?}, refusing to merge a {incoming:?} into it")]
pub struct KindMismatch {
    /// Labels shared by both entries.
    pub labels: Labels,
    /// Kind of the stored entry.
    pub existing: MetricKind,
    /// Kind of the rejected entry.
    pub incoming: MetricKind,
}
