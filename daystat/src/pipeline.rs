// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The ingestion pipeline: a bounded queue of Writers drained by a small pool of named threads.

use std::{
    fmt,
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_queue::ArrayQueue;
use crossbeam_utils::sync::{Parker, Unparker};
use daystat_aggregation::Monitor;
use daystat_core::{CollectSink, Collector, WriteError, Writer, materialize, rate_limited};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{BuildError, IngestError};

/// What happens to an observation pushed into a full queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued observation to make room. Recent observations describe the
    /// current state of the service better than old ones.
    #[default]
    DropOldest,
    /// Keep the queue as is and fail the push with [`IngestError::Full`].
    RejectNewest,
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    capacity: usize,
    workers: usize,
    thread_name: String,
    overflow: OverflowPolicy,
    idle_poll: Duration,
    cancellation: Option<CancellationToken>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            capacity: 1 << 20,
            workers: 3,
            thread_name: "daystat-worker".into(),
            overflow: OverflowPolicy::DropOldest,
            idle_poll: Duration::from_millis(100),
            cancellation: None,
        }
    }
}

impl PipelineBuilder {
    /// A builder with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of Writers the queue holds before the [`OverflowPolicy`] kicks in.
    ///
    /// Defaults to `1 << 20`. This is a number of queued observations, not bytes.
    pub fn capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0);
        self.capacity = capacity;
        self
    }

    /// Sets the number of worker threads. Defaults to 3.
    pub fn workers(mut self, workers: usize) -> Self {
        assert!(workers > 0, "a pipeline needs at least one worker");
        self.workers = workers;
        self
    }

    /// Thread name prefix for the workers. Worker `i` is named `{name}-{i}`.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty());
        self.thread_name = name;
        self
    }

    /// Sets the behavior of a full queue. Defaults to [`OverflowPolicy::DropOldest`].
    ///
    /// A [`tracing`] error is emitted periodically while observations are being lost.
    pub fn overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Sets how long an idle worker sleeps before checking the queue again when nobody wakes it.
    ///
    /// Defaults to 100ms. Must be in the range (0, 1 minute).
    pub fn idle_poll(mut self, idle_poll: Duration) -> Self {
        assert!(
            Duration::ZERO < idle_poll && idle_poll < Duration::from_secs(60),
            "idle_poll must be in the range (0, 1 minute), not {idle_poll:?}"
        );
        self.idle_poll = idle_poll;
        self
    }

    /// Stop the workers when `token` is cancelled. Without this, the pipeline uses a private token
    /// reachable through [`PipelineJoinHandle::cancel`].
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Starts the workers, which dispatch every materialized metric to `monitor`.
    ///
    /// Returns the producer handle and a [`PipelineJoinHandle`] that drains the queue and joins
    /// the workers when dropped.
    pub fn build(self, monitor: Monitor) -> Result<(Pipeline, PipelineJoinHandle), BuildError> {
        let cancellation = self.cancellation.unwrap_or_default();
        let parkers: Vec<Parker> = (0..self.workers).map(|_| Parker::new()).collect();
        let inner = Arc::new(Inner {
            queue: ArrayQueue::new(self.capacity),
            overflow: self.overflow,
            unparkers: parkers.iter().map(|p| p.unparker().clone()).collect(),
            next_worker: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            cancellation: cancellation.clone(),
            enqueued: AtomicU64::new(0),
            completed: Mutex::new(0),
            progress: Condvar::new(),
            live_workers: AtomicUsize::new(self.workers),
        });

        let mut join = PipelineJoinHandle {
            handles: Vec::with_capacity(self.workers),
            inner: Arc::clone(&inner),
        };
        for (index, parker) in parkers.into_iter().enumerate() {
            let worker = Worker {
                index,
                name: self.thread_name.clone(),
                inner: Arc::clone(&inner),
                monitor: monitor.clone(),
                parker,
                idle_poll: self.idle_poll,
            };
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", self.thread_name))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => join.handles.push(handle),
                Err(err) => {
                    // workers that never started will not decrement the live count
                    inner
                        .live_workers
                        .fetch_sub(self.workers - index, Ordering::AcqRel);
                    drop(join);
                    return Err(BuildError::Spawn(err));
                }
            }
        }
        tracing::info!(
            pipeline = %self.thread_name,
            workers = self.workers,
            capacity = self.capacity,
            "started ingestion pipeline"
        );

        Ok((Pipeline(inner), join))
    }
}

/// Producer handle for the ingestion queue.
///
/// Cloning is cheap and still pushes into the same queue. `Pipeline` is the [`CollectSink`] that
/// instruments created by an [`Engine`](crate::Engine) collect into.
#[derive(Clone)]
pub struct Pipeline(Arc<Inner>);

struct Inner {
    // crossbeam's ArrayQueue rather than std::sync::mpsc because DropOldest needs ring buffer
    // behavior
    queue: ArrayQueue<Arc<dyn Writer>>,
    overflow: OverflowPolicy,
    // lets producers cheaply wake an idle worker
    unparkers: Vec<Unparker>,
    next_worker: AtomicUsize,
    closed: AtomicBool,
    cancellation: CancellationToken,
    // every Writer accepted into the queue counts once in `enqueued`, and once in `completed`
    // when it was dispatched, dropped on failure, or evicted
    enqueued: AtomicU64,
    completed: Mutex<u64>,
    progress: Condvar,
    live_workers: AtomicUsize,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("queued", &self.0.queue.len())
            .field("capacity", &self.0.queue.capacity())
            .field("overflow", &self.0.overflow)
            .field("closed", &self.0.is_closed())
            .finish()
    }
}

impl Pipeline {
    /// Enqueue `writer` for a worker to materialize and dispatch.
    ///
    /// Never blocks. Under [`OverflowPolicy::DropOldest`] a full queue evicts its oldest entry
    /// and this still succeeds.
    pub fn push(&self, writer: Arc<dyn Writer>) -> Result<(), IngestError> {
        self.0.push(writer)
    }

    /// Let `instrument` push its Writer into this pipeline.
    pub fn ingest(&self, instrument: &dyn Collector) {
        instrument.collect(self);
    }

    /// Number of Writers waiting for a worker.
    pub fn queued(&self) -> usize {
        self.0.queue.len()
    }

    /// Returns `true` once the pipeline stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    /// Blocks until every Writer enqueued before this call has been handled, or the workers are
    /// gone. Returns `false` in the latter case if something was left undispatched.
    pub fn flush(&self) -> bool {
        self.0.flush()
    }
}

impl CollectSink for Pipeline {
    fn accept(&self, writer: Arc<dyn Writer>) {
        match self.0.push(writer) {
            Ok(()) => {}
            Err(IngestError::Full) => rate_limited!(
                Duration::from_secs(1),
                tracing::error!("ingestion queue is full, observations will be missing")
            ),
            Err(IngestError::Closed) => rate_limited!(
                Duration::from_secs(60),
                tracing::warn!("ingestion pipeline is closed, dropping observation")
            ),
        }
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.cancellation.is_cancelled()
    }

    fn push(&self, writer: Arc<dyn Writer>) -> Result<(), IngestError> {
        if self.is_closed() {
            return Err(IngestError::Closed);
        }
        match self.overflow {
            OverflowPolicy::DropOldest => {
                self.enqueued.fetch_add(1, Ordering::AcqRel);
                if self.queue.force_push(writer).is_some() {
                    self.complete();
                    rate_limited!(
                        Duration::from_secs(1),
                        tracing::error!(
                            "ingestion queue has fallen behind, observations will be missing"
                        )
                    );
                }
            }
            OverflowPolicy::RejectNewest => {
                self.queue.push(writer).map_err(|_| IngestError::Full)?;
                self.enqueued.fetch_add(1, Ordering::AcqRel);
            }
        }
        // the ordering between the push and the unpark is not critical, an idle worker wakes up
        // on its own after idle_poll
        self.wake_one();
        Ok(())
    }

    fn wake_one(&self) {
        let i = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.unparkers.len();
        self.unparkers[i].unpark();
    }

    fn wake_all(&self) {
        for unparker in &self.unparkers {
            unparker.unpark();
        }
    }

    fn complete(&self) {
        *self.completed.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.progress.notify_all();
    }

    fn worker_exited(&self) {
        // hold the lock so a concurrent flush cannot miss the wakeup
        let _completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
        self.live_workers.fetch_sub(1, Ordering::AcqRel);
        self.progress.notify_all();
    }

    fn flush(&self) -> bool {
        let target = self.enqueued.load(Ordering::Acquire);
        let mut completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
        while *completed < target {
            if self.live_workers.load(Ordering::Acquire) == 0 {
                return false;
            }
            self.wake_all();
            completed = self
                .progress
                .wait_timeout(completed, Duration::from_millis(50))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Guard handle that, when dropped, closes the pipeline and blocks until the workers have drained
/// the queue and exited.
pub struct PipelineJoinHandle {
    handles: Vec<thread::JoinHandle<()>>,
    inner: Arc<Inner>,
}

impl fmt::Debug for PipelineJoinHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineJoinHandle")
            .field("workers", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl PipelineJoinHandle {
    /// Alias for `drop(handle)`. Stops accepting work, lets the workers dispatch everything still
    /// queued, then joins them.
    pub fn shut_down(self) {}

    /// Stop the workers after the Writer each of them is currently running. Queued Writers are
    /// discarded. Dropping the handle afterwards only joins.
    pub fn cancel(&self) {
        tracing::info!("cancelling ingestion pipeline");
        self.inner.cancellation.cancel();
        self.inner.wake_all();
    }

    /// The token that stops the workers when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation.clone()
    }
}

impl Drop for PipelineJoinHandle {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.inner.closed.store(true, Ordering::Release);
        self.inner.wake_all();
        tracing::info!("awaiting ingestion pipeline shutdown");
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("ingestion worker panicked");
            }
        }
        tracing::info!("ingestion pipeline shut down");
    }
}

// Worker thread state.
struct Worker {
    index: usize,
    name: String,
    inner: Arc<Inner>,
    monitor: Monitor,
    parker: Parker,
    idle_poll: Duration,
}

impl Worker {
    fn run(self) {
        let span = tracing::span!(
            tracing::Level::TRACE,
            "daystat ingestion worker",
            pipeline = %self.name,
            worker = self.index
        );
        let _enter = span.enter();
        let started = Instant::now();
        let mut dispatched = 0u64;

        loop {
            if self.inner.cancellation.is_cancelled() {
                tracing::info!("caught cancellation, stopping ingestion worker");
                break;
            }
            match self.inner.queue.pop() {
                Some(writer) => {
                    if self.consume(writer.as_ref()) {
                        dispatched += 1;
                    }
                    self.inner.complete();
                }
                None if self.inner.closed.load(Ordering::Acquire) => {
                    tracing::debug!("queue closed and drained, stopping ingestion worker");
                    break;
                }
                None => self.parker.park_timeout(self.idle_poll),
            }
        }

        tracing::debug!(dispatched, uptime = ?started.elapsed(), "ingestion worker exited");
        self.inner.worker_exited();
    }

    fn consume(&self, writer: &dyn Writer) -> bool {
        match materialize(writer, self.monitor.today()) {
            Ok(metric) => {
                self.monitor.dispatch(&metric);
                true
            }
            // most Writers of a busy instrument find their state already taken
            Err(WriteError::Empty) => {
                tracing::trace!("writer had nothing pending");
                false
            }
            Err(err) => {
                rate_limited!(
                    Duration::from_secs(1),
                    tracing::error!(%err, "writer failed, dropping observation")
                );
                false
            }
        }
    }
}
