// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// An observation was not accepted into the ingestion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The pipeline was shut down or cancelled.
    #[error("ingestion pipeline is closed")]
    Closed,
    /// The queue is full and the overflow policy rejects new observations.
    #[error("ingestion queue is full")]
    Full,
}

/// A [`Config`](crate::Config) value is out of range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `window_days` must be at least 1.
    #[error("window_days must be at least 1")]
    Window,
    /// `queue_capacity` must be at least 1.
    #[error("queue_capacity must be at least 1")]
    QueueCapacity,
    /// `workers` must be between 1 and the given maximum.
    #[error("workers must be between 1 and {max}, not {workers}")]
    Workers {
        /// The configured value.
        workers: usize,
        /// The largest accepted value.
        max: usize,
    },
    /// `idle_poll_ms` must be below one minute and not zero.
    #[error("idle_poll_ms must be in the range 1..60000, not {0}")]
    IdlePoll(u64),
    /// `thread_name` must not be empty.
    #[error("thread_name must not be empty")]
    ThreadName,
}

/// The engine could not be started.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A worker thread could not be spawned.
    #[error("failed to spawn ingestion worker: {0}")]
    Spawn(#[source] std::io::Error),
}
