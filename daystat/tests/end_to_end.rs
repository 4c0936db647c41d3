// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use assert2::check;
use daystat::{
    Config, Day, DaySelector, Engine, Label, MetricValue, PipelineJoinHandle, QueryParams, RankBy,
    Snapshot, TimeSource, WriteError, Writer, labels, test_util::ManuallyAdvancedTimeSource,
};

const DAY: i64 = 19_388;

fn engine(window_days: usize) -> (Engine, PipelineJoinHandle, ManuallyAdvancedTimeSource) {
    let clock = ManuallyAdvancedTimeSource::at_day(DAY);
    let config = Config {
        window_days,
        queue_capacity: 4096,
        idle_poll_ms: 10,
        ..Config::default()
    };
    let (engine, join) = Engine::with_time_source(&config, TimeSource::custom(clock.clone()))
        .expect("valid config");
    (engine, join, clock)
}

#[test]
fn three_increments_query_as_one_entry() {
    let (engine, _join, _) = engine(7);
    let counter = engine.counter(labels!["method" => "GET", "path" => "/x"]);
    for _ in 0..3 {
        counter.inc();
        // flush between increments so each one travels through the pipeline on its own
        check!(engine.flush());
    }

    let families = engine.query(&[DaySelector::TODAY], &[]);
    check!(families.len() == 1);
    check!(families[0].day == Some(Day(DAY)));
    check!(families[0].metrics.len() == 1);
    check!(families[0].metrics[0].value == MetricValue::Counter(3));
    check!(families[0].metrics[0].labels == labels!["method" => "GET", "path" => "/x"]);
}

#[test]
fn max_gauge_reports_largest_observation() {
    let (engine, _join, _) = engine(7);
    let max = engine.max_gauge(labels!["api" => "/x"]);
    for v in [10, 30, 20] {
        max.observe(v);
        engine.flush();
    }
    let families = engine.query(&[DaySelector::TODAY], &[]);
    check!(families[0].metrics[0].value == MetricValue::MaxGauge(30));
}

#[test]
fn eviction_after_window_is_exceeded() {
    let (engine, _join, clock) = engine(3);
    let counter = engine.counter(labels!["api" => "/x"]);
    for offset in 0..4 {
        clock.set_day(DAY + offset);
        counter.inc();
        engine.flush();
    }

    // today is DAY + 3; DAY itself fell out of the 3-day window
    check!(engine.monitor().daily().days() == [Day(DAY + 3), Day(DAY + 2), Day(DAY + 1)]);
    let oldest = engine.query(&[DaySelector::DaysAgo(4)], &[]);
    check!(oldest[0].day == Some(Day(DAY)));
    check!(oldest[0].is_empty());

    let lifetime = engine.query(&[DaySelector::Lifetime], &[]);
    check!(lifetime[0].metrics[0].value == MetricValue::Counter(4));
}

#[test]
fn lifetime_keeps_every_label_set() {
    let (engine, _join, _) = engine(7);
    for i in 0..25 {
        engine.counter(labels!["api" => format!("/{i}")]).inc();
    }
    engine.flush();
    check!(engine.monitor().lifetime().len() == 25);
}

#[test]
fn top_n_by_count_over_three_days() {
    let (engine, _join, clock) = engine(7);
    let users = engine.request_recorder("/users");
    for (offset, requests) in [(0, 5), (1, 9), (2, 1)] {
        clock.set_day(DAY + offset);
        for _ in 0..requests {
            users.record_millis(10);
        }
        engine.flush();
    }

    let days = [DaySelector::DaysAgo(3), DaySelector::DaysAgo(2), DaySelector::TODAY];
    let top = engine.top_n(&days, &[], RankBy::Count, 2);
    check!(top.len() == 2);
    check!(top[0].request_count == 9);
    check!(top[0].day == Some(Day(DAY + 1)));
    check!(top[1].request_count == 5);
    for summary in &top {
        check!(summary.api.as_deref() == Some("/users"));
        check!(summary.request_total_latency == 0);
        check!(summary.max_latency == 0);
        check!(summary.min_latency == 0);
        check!(summary.average_latency == 0);
    }
}

#[test]
fn search_ranks_endpoints_by_average_latency() {
    let (engine, _join, _) = engine(7);
    let fast = engine.request_recorder("/fast");
    let slow = engine.request_recorder("/slow");
    fast.record(Duration::from_millis(2));
    fast.record(Duration::from_millis(4));
    slow.record(Duration::from_millis(100));
    engine.flush();

    let params: QueryParams = "days=1&labels=api:*&rank_by=avg&n=0".parse().unwrap();
    let top = engine.search(&params);
    let ranked: Vec<_> = top
        .iter()
        .map(|s| (s.api.as_deref().unwrap_or_default(), s.average_latency))
        .collect();
    check!(ranked == [("/slow", 100), ("/fast", 3)]);

    let json = serde_json::to_value(&top[0]).unwrap();
    check!(json["api"] == "/slow");
    check!(json["average_latency"] == 100);
    check!(json["request_count"] == 0);
}

#[test]
fn label_filter_is_disjunctive() {
    let (engine, _join, _) = engine(7);
    for path in ["/a", "/b", "/c"] {
        engine.counter(labels!["path" => path]).inc();
    }
    engine.flush();

    let filtered = engine.query(
        &[DaySelector::TODAY],
        &[Label::new("path", "/b"), Label::new("path", "/c")],
    );
    check!(filtered[0].metrics.len() == 2);
    let none = engine.query(&[DaySelector::TODAY], &[Label::new("path", "/z")]);
    check!(none[0].is_empty());
}

#[test]
fn discover_labels_by_latency_threshold() {
    let (engine, _join, _) = engine(7);
    engine
        .request_recorder("/slow")
        .with(&[Label::new("host", "a")])
        .record_millis(900);
    engine
        .request_recorder("/fast")
        .with(&[Label::new("host", "b")])
        .record_millis(3);
    engine.flush();

    check!(engine.discover_labels(500, 0) == [Label::new("host", "a")]);
    check!(engine.discover_labels(0, 10) == [Label::new("host", "a"), Label::new("host", "b")]);
    check!(engine.discover_labels(1_000, 10) == [Label::new("host", "b")]);
    let all = engine.discover_labels(0, 0);
    check!(all.contains(&Label::new("api", "/slow")));
    check!(all.contains(&Label::new("api_metric", "request_count")));
}

struct Broken;

impl Writer for Broken {
    fn write(&self, _: &mut Snapshot) -> Result<(), WriteError> {
        Err(WriteError::Rejected("sensor offline".into()))
    }
}

struct BrokenInstrument;

impl daystat::Collector for BrokenInstrument {
    fn collect(&self, sink: &dyn daystat::CollectSink) {
        sink.accept(Arc::new(Broken));
    }
}

#[test]
fn failing_writers_do_not_stop_ingestion() {
    let (engine, _join, _) = engine(7);
    for _ in 0..5 {
        engine.ingest(&BrokenInstrument);
    }
    engine.counter(labels!["api" => "/ok"]).inc();
    check!(engine.flush());
    let families = engine.query(&[DaySelector::TODAY], &[]);
    check!(families[0].metrics.len() == 1);
    check!(families[0].metrics[0].labels.get("api") == Some("/ok"));
}

#[test]
fn invalid_config_is_rejected() {
    let config = Config {
        workers: 0,
        ..Config::default()
    };
    check!(let Err(daystat::BuildError::Config(_)) = Engine::new(&config));
}
