// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Aggregation stores and queries for daystat.
//!
//! Every metric is dispatched to two stores: a [`DailyStore`] that keeps a fixed window of
//! per-day buckets, and a [`LifetimeStore`] that keeps everything. A [`Monitor`] owns both and
//! answers day and label filtered reads, which [`query`] turns into ranked request statistics.

mod daily;
mod lifetime;
mod monitor;
pub mod query;

pub use daily::{DAILY_FAMILY, DailyStore, Routed};
pub use lifetime::{LIFETIME_FAMILY, LifetimeStore};
pub use monitor::{DaySelector, Monitor};
