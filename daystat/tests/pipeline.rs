// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, thread, time::Duration};

use assert2::check;
use daystat::{
    Config, DaySelector, Engine, IngestError, MetricValue, OverflowPolicy, PipelineBuilder,
    Snapshot, TimeSource, WriteError, Writer, labels, test_util::StaticTimeSource,
};
use tokio_util::sync::CancellationToken;

const DAY: i64 = 19_388;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn clock() -> TimeSource {
    TimeSource::custom(StaticTimeSource::at_day(DAY))
}

fn today_counter_total(engine: &Engine) -> u64 {
    engine.query(&[DaySelector::TODAY], &[])[0]
        .metrics
        .iter()
        .filter(|m| matches!(m.value, MetricValue::Counter(_)))
        .map(|m| m.value.get())
        .sum()
}

#[test]
fn many_producers_lose_nothing() {
    init_tracing();
    let config = Config {
        workers: 4,
        idle_poll_ms: 5,
        ..Config::default()
    };
    let (engine, join) = Engine::with_time_source(&config, clock()).unwrap();

    thread::scope(|s| {
        for t in 0..8 {
            let engine = engine.clone();
            s.spawn(move || {
                let counter = engine.counter(labels!["api" => "/shared"]);
                let own = engine.counter(labels!["api" => format!("/thread-{t}")]);
                for _ in 0..500 {
                    counter.inc();
                    own.inc();
                }
            });
        }
    });
    join.shut_down();

    let families = engine.query(&[DaySelector::TODAY], &[]);
    let shared = families[0].get(&labels!["api" => "/shared"]).map(|m| m.value);
    check!(shared == Some(MetricValue::Counter(4_000)));
    check!(families[0].metrics.len() == 9);
    check!(today_counter_total(&engine) == 8_000);
}

#[test]
fn shut_down_drains_and_closes() {
    init_tracing();
    let (engine, join) = Engine::with_time_source(&Config::default(), clock()).unwrap();
    let counter = engine.counter(labels!["api" => "/x"]);
    for _ in 0..1_000 {
        counter.inc();
    }
    join.shut_down();
    check!(today_counter_total(&engine) == 1_000);
    check!(engine.pipeline().is_closed());

    // later observations are dropped without blocking
    counter.inc();
    check!(engine.pipeline().queued() == 0);
    check!(engine.flush());
}

struct Slow(Duration);

impl Writer for Slow {
    fn write(&self, snapshot: &mut Snapshot) -> Result<(), WriteError> {
        thread::sleep(self.0);
        snapshot.set_labels(labels!["api" => "/slow"]);
        snapshot.set_value(MetricValue::Counter(1))
    }
}

#[test]
fn external_cancellation_stops_without_draining() {
    init_tracing();
    let token = CancellationToken::new();
    let builder = PipelineBuilder::new()
        .workers(1)
        .capacity(1_000)
        .cancellation_token(token.clone());
    let (engine, join) = Engine::with_pipeline(builder, 7, clock()).unwrap();

    for _ in 0..100 {
        engine
            .pipeline()
            .push(Arc::new(Slow(Duration::from_millis(20))))
            .unwrap();
    }
    thread::sleep(Duration::from_millis(50));
    token.cancel();
    drop(join);

    // the in-flight write finished, the rest of the queue was abandoned
    let dispatched = today_counter_total(&engine);
    check!(dispatched >= 1);
    check!(dispatched < 100);
    check!(engine.pipeline().queued() > 0);
    check!(
        engine.pipeline().push(Arc::new(Slow(Duration::ZERO))) == Err(IngestError::Closed)
    );
    check!(!engine.flush());
}

#[test]
fn reject_newest_surfaces_full_queue() {
    init_tracing();
    let token = CancellationToken::new();
    let builder = PipelineBuilder::new()
        .workers(1)
        .capacity(2)
        .overflow(OverflowPolicy::RejectNewest)
        .cancellation_token(token.clone());
    let (engine, join) = Engine::with_pipeline(builder, 7, clock()).unwrap();

    // keep the single worker busy so the queue stays full
    engine
        .pipeline()
        .push(Arc::new(Slow(Duration::from_millis(300))))
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    let mut results = Vec::new();
    for _ in 0..3 {
        results.push(engine.pipeline().push(Arc::new(Slow(Duration::ZERO))));
    }
    check!(results[0] == Ok(()));
    check!(results[1] == Ok(()));
    check!(results[2] == Err(IngestError::Full));

    check!(engine.flush());
    check!(today_counter_total(&engine) == 3);
    token.cancel();
    join.shut_down();
}

#[test]
fn drop_oldest_keeps_accepting() {
    init_tracing();
    let builder = PipelineBuilder::new()
        .workers(1)
        .capacity(2)
        .overflow(OverflowPolicy::DropOldest);
    let (engine, join) = Engine::with_pipeline(builder, 7, clock()).unwrap();

    engine
        .pipeline()
        .push(Arc::new(Slow(Duration::from_millis(300))))
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    for _ in 0..10 {
        check!(engine.pipeline().push(Arc::new(Slow(Duration::ZERO))) == Ok(()));
    }
    check!(engine.flush());
    // the busy Writer plus the two that were still queued
    check!(today_counter_total(&engine) == 3);
    join.shut_down();
}
