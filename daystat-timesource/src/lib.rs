// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Wall clock abstraction for daystat.
//!
//! Everything in daystat that needs "today" asks a [`TimeSource`] rather than
//! calling [`SystemTime::now`] directly, so tests can pin or advance the clock
//! with the fakes in [`fakes`].

use std::{
    fmt::Debug,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

/// Module containing fake time sources for testing
///
/// To enable this module, you must enable the `test-util` feature.
#[cfg(feature = "test-util")]
pub mod fakes;

/// Number of seconds in one UTC day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Trait for providing custom time sources
///
/// Implementors of this trait can be used to provide custom time behavior
/// for testing or specialized use cases.
pub trait Time: Send + Sync + Debug {
    /// Get the current system time
    fn now(&self) -> SystemTime;
}

/// Source of the current wall clock time.
///
/// Cloning is cheap; a custom source is shared behind an [`Arc`].
#[derive(Clone, Default)]
pub enum TimeSource {
    /// Use the system time
    #[default]
    System,
    /// Use a custom time source
    Custom(Arc<dyn Time>),
}

impl Debug for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "TimeSource::System"),
            Self::Custom(_) => write!(f, "TimeSource::Custom(...)"),
        }
    }
}

impl TimeSource {
    /// Create a new TimeSource with a custom time implementation
    ///
    /// # Examples
    ///
    /// ```
    /// use daystat_timesource::{TimeSource, fakes::StaticTimeSource};
    /// use std::time::UNIX_EPOCH;
    ///
    /// let ts = TimeSource::custom(StaticTimeSource::at_time(UNIX_EPOCH));
    /// assert_eq!(ts.system_time(), UNIX_EPOCH);
    /// ```
    pub fn custom(custom: impl Time + 'static) -> TimeSource {
        Self::Custom(Arc::new(custom))
    }

    /// Get the current [`SystemTime`] from this time source
    pub fn system_time(&self) -> SystemTime {
        match self {
            Self::System => SystemTime::now(),
            Self::Custom(ts) => ts.now(),
        }
    }

    /// Returns the current UTC day number, i.e. whole days since the Unix epoch.
    ///
    /// ```
    /// use daystat_timesource::{TimeSource, fakes::StaticTimeSource};
    /// use std::time::{Duration, UNIX_EPOCH};
    ///
    /// let ts = TimeSource::custom(StaticTimeSource::at_time(
    ///     UNIX_EPOCH + Duration::from_secs(19_388 * 86_400 + 5),
    /// ));
    /// assert_eq!(ts.today(), 19_388);
    /// ```
    pub fn today(&self) -> i64 {
        unix_day(self.system_time())
    }
}

/// Converts a point in time to its UTC day number.
///
/// Times before the epoch round towards negative infinity, so the second before
/// the epoch is day `-1`.
pub fn unix_day(time: SystemTime) -> i64 {
    let secs = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => {
            let before = before.duration();
            let whole = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
            // a fractional second before the epoch still belongs to the previous second
            if before.subsec_nanos() > 0 {
                -whole - 1
            } else {
                -whole
            }
        }
    };
    secs.div_euclid(SECONDS_PER_DAY)
}
