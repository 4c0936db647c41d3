// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, OverflowPolicy, PipelineBuilder};

/// Largest accepted worker count.
pub const MAX_WORKERS: usize = 256;

/// Parameters used by the [`Engine`](crate::Engine).
///
/// Every field has a default, so a partial document deserializes into a complete config.
///
/// ```
/// let config: daystat::Config = serde_json::from_str(r#"{"window_days": 30}"#).unwrap();
/// assert_eq!(config.window_days, 30);
/// assert_eq!(config.workers, 3);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of days the windowed store keeps.
    ///
    /// Defaults to `7`. Days older than this are evicted as new days arrive; they remain
    /// visible only through the lifetime store.
    pub window_days: usize,

    /// Number of observations the ingestion queue holds.
    ///
    /// Defaults to `1_048_576`. What happens beyond that is decided by `overflow`.
    pub queue_capacity: usize,

    /// Number of worker threads draining the queue.
    ///
    /// Defaults to `3`.
    pub workers: usize,

    /// Behavior of a full queue.
    ///
    /// Defaults to `drop_oldest`.
    pub overflow: OverflowPolicy,

    /// How long an idle worker sleeps before polling the queue again, in milliseconds.
    ///
    /// Defaults to `100`. Producers wake workers directly, so this only bounds how long a missed
    /// wakeup can delay ingestion.
    pub idle_poll_ms: u64,

    /// Name prefix of the worker threads.
    ///
    /// Defaults to `"daystat-worker"`.
    pub thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_days: 7,
            queue_capacity: 1 << 20,
            workers: 3,
            overflow: OverflowPolicy::DropOldest,
            idle_poll_ms: 100,
            thread_name: "daystat-worker".to_owned(),
        }
    }
}

impl Config {
    /// Checks every field against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_days == 0 {
            return Err(ConfigError::Window);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacity);
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::Workers {
                workers: self.workers,
                max: MAX_WORKERS,
            });
        }
        if self.idle_poll_ms == 0 || self.idle_poll_ms >= 60_000 {
            return Err(ConfigError::IdlePoll(self.idle_poll_ms));
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::ThreadName);
        }
        Ok(())
    }

    /// The idle poll interval as a [`Duration`].
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// A [`PipelineBuilder`] carrying the pipeline settings of this config.
    pub fn pipeline_builder(&self) -> Result<PipelineBuilder, ConfigError> {
        self.validate()?;
        Ok(PipelineBuilder::new()
            .capacity(self.queue_capacity)
            .workers(self.workers)
            .overflow(self.overflow)
            .idle_poll(self.idle_poll())
            .thread_name(self.thread_name.clone()))
    }
}
