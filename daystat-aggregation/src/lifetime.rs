// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{PoisonError, RwLock};

use daystat_core::{Absorbed, KindMismatch, Metric, MetricFamily};

/// Name of the family produced by a [`LifetimeStore`].
pub const LIFETIME_FAMILY: &str = "lifetime";

/// Accumulates every metric ever seen, keyed by label set only. Nothing is evicted.
#[derive(Debug)]
pub struct LifetimeStore {
    family: RwLock<MetricFamily>,
}

impl Default for LifetimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LifetimeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            family: RwLock::new(MetricFamily::new(LIFETIME_FAMILY, None)),
        }
    }

    /// Merges `metric` into the entry with the same labels, or appends a clone of it.
    pub fn handle(&self, metric: &Metric) -> Result<Absorbed, KindMismatch> {
        self.family
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(metric)
    }

    /// Deep copy of the accumulated family.
    pub fn snapshot(&self) -> MetricFamily {
        self.family
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs `f` against the family under the shared lock, without copying it.
    pub fn inspect<R>(&self, f: impl FnOnce(&MetricFamily) -> R) -> R {
        f(&self.family.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of distinct label sets seen.
    pub fn len(&self) -> usize {
        self.inspect(|family| family.metrics.len())
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
