// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Records latencies for a few fake endpoints, then prints the slowest ones as JSON.
//!
//! Run with `RUST_LOG=daystat=debug` to see the pipeline's own logs.

use std::time::Duration;

use daystat::{Config, Engine, QueryParams};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config {
        workers: 2,
        ..Config::default()
    };
    let (engine, join) = Engine::new(&config).unwrap();

    let endpoints = [("/users", 12u64), ("/orders", 40), ("/health", 1)];
    for (api, base) in endpoints {
        let recorder = engine.request_recorder(api);
        for i in 0..20 {
            recorder.record(Duration::from_millis(base + i % 7));
        }
        // a timer records when it goes out of scope
        let timer = recorder.start();
        std::thread::sleep(Duration::from_millis(base));
        timer.finish();
    }
    engine.flush();

    let params: QueryParams = "days=1&rank_by=max&n=2".parse().unwrap();
    for summary in engine.search(&params) {
        println!("{}", serde_json::to_string(&summary).unwrap());
    }

    join.shut_down();
}
