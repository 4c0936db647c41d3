// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

fn millis_since_start() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    let elapsed = START.get_or_init(Instant::now).elapsed();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Gate shared by every evaluation of one `rate_limited!` call site.
///
/// Holds the earliest time, in milliseconds since the first gate was consulted, at which the
/// gate opens again. Only one of several racing threads wins an opening.
#[doc(hidden)]
pub struct Gate {
    opens_at: AtomicU64,
}

impl Gate {
    #[doc(hidden)]
    pub const fn new() -> Self {
        Self {
            opens_at: AtomicU64::new(0),
        }
    }

    /// Returns `true` at most once per `interval`.
    #[doc(hidden)]
    pub fn pass(&self, interval: Duration) -> bool {
        let now = millis_since_start();
        let opens_at = self.opens_at.load(Ordering::Relaxed);
        if now < opens_at {
            return false;
        }
        let interval = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.opens_at
            .compare_exchange(
                opens_at,
                now.saturating_add(interval.max(1)),
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// `rate_limited!(interval, expr)` evaluates `expr` at most once every `interval` across all
/// threads.
///
/// Used for error logs on the ingestion path: a queue that stays full, or a Writer that keeps
/// failing, logs on the first occurrence and then once per interval while the problem persists.
///
/// Each call site has its own limit.
///
/// ```
/// use std::time::Duration;
///
/// let mut calls = 0;
/// for _ in 0..10 {
///     daystat_core::rate_limited!(Duration::from_secs(60), calls += 1);
/// }
/// assert_eq!(calls, 1);
/// ```
#[macro_export]
macro_rules! rate_limited {
    ($interval:expr, $call:expr) => {{
        static GATE: $crate::rate_limit::Gate = $crate::rate_limit::Gate::new();
        if GATE.pass($interval) {
            $call;
        }
    }};
}
