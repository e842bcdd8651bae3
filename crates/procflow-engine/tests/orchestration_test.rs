// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests against real worker processes
//!
//! Every test spawns `procflow-demo-worker` processes behind a result sink and
//! talks to them only through the public handle.

use crossbeam::channel::{self, Receiver};
use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::{Duration, Instant};

use procflow_config::EngineConfig;
use procflow_engine::logbus::LogCollector;
use procflow_engine::manager::{PoolBroadcast, SingleDaemon};
use procflow_engine::sink::{ResultSink, SinkEvent};
use procflow_engine::supervisor::{Supervisor, WorkerCommand};
use procflow_engine::WorkerId;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn demo_worker(mode: &str) -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_procflow-demo-worker")).flag("--mode", mode)
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.supervisor.terminate_grace_ms = 2000;
    config
}

fn next_event(events: &Receiver<SinkEvent>) -> SinkEvent {
    events
        .recv_timeout(EVENT_TIMEOUT)
        .expect("no sink event within timeout")
}

/// Collect events until the sink reports termination
fn drain_until_terminated(events: &Receiver<SinkEvent>) -> Vec<SinkEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events);
        if event == SinkEvent::Terminated {
            return seen;
        }
        seen.push(event);
    }
}

fn stopped_workers(events: &[SinkEvent]) -> BTreeSet<WorkerId> {
    events
        .iter()
        .filter_map(|event| match event {
            SinkEvent::WorkerStopped(id) => Some(*id),
            _ => None,
        })
        .collect()
}

fn count_job(count: u64, interval_ms: u64) -> Vec<u8> {
    format!(r#"{{"count":{},"interval_ms":{}}}"#, count, interval_ms).into_bytes()
}

/// Sequence number of a pool-counter item from `worker_id`
fn seq_of(event: SinkEvent, worker_id: WorkerId) -> u64 {
    match event {
        SinkEvent::Result { worker_id: from, record } if from == worker_id => {
            let item: serde_json::Value = serde_json::from_slice(&record).unwrap();
            item["seq"].as_u64().unwrap()
        }
        other => panic!("unexpected event {:?}", other),
    }
}

fn next_seq(events: &Receiver<SinkEvent>, worker_id: WorkerId) -> u64 {
    seq_of(next_event(events), worker_id)
}

#[test]
fn test_pool_startup_routes_records_by_worker_id() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    for worker_id in 1..=3 {
        sink.start_worker(worker_id, format!("initial-{}", worker_id).into_bytes())
            .unwrap();
    }

    let mut received: BTreeMap<WorkerId, Vec<u8>> = BTreeMap::new();
    while received.len() < 3 {
        match next_event(&events) {
            SinkEvent::Result { worker_id, record } => {
                assert!(received.insert(worker_id, record).is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    for worker_id in 1..=3 {
        assert_eq!(received[&worker_id], format!("initial-{}", worker_id).into_bytes());
    }

    // Worker 12 must not see records addressed to worker 1
    sink.start_worker(12, b"twelve".to_vec()).unwrap();
    sink.send_to_worker(Some(1), b"only-one".to_vec()).unwrap();
    let mut addressed = Vec::new();
    while addressed.len() < 2 {
        if let SinkEvent::Result { worker_id, record } = next_event(&events) {
            addressed.push((worker_id, record));
        }
    }
    addressed.sort();
    assert_eq!(addressed, vec![(1, b"only-one".to_vec()), (12, b"twelve".to_vec())]);

    sink.stop().unwrap();
    let remaining = drain_until_terminated(&events);
    assert_eq!(stopped_workers(&remaining), BTreeSet::from([1, 2, 3, 12]));
    reactor.join().unwrap();
    assert!(!sink.is_running());
}

#[test]
fn test_stop_with_no_workers_terminates_sink() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    sink.stop().unwrap();
    assert!(drain_until_terminated(&events).is_empty());
    reactor.join().unwrap();
}

#[test]
fn test_stop_interrupts_busy_workers() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    sink.start_worker(1, count_job(10_000, 10)).unwrap();
    sink.start_worker(2, count_job(10_000, 10)).unwrap();

    let mut busy = BTreeSet::new();
    while busy.len() < 2 {
        if let SinkEvent::Result { worker_id, .. } = next_event(&events) {
            busy.insert(worker_id);
        }
    }

    sink.stop().unwrap();
    let remaining = drain_until_terminated(&events);
    assert_eq!(stopped_workers(&remaining), BTreeSet::from([1, 2]));
    reactor.join().unwrap();
}

#[test]
fn test_finished_worker_reports_finished() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    sink.start_worker(5, br#"{"count":3,"interval_ms":0,"finish":true}"#.to_vec())
        .unwrap();

    let mut results = 0;
    loop {
        match next_event(&events) {
            SinkEvent::Result { worker_id: 5, .. } => results += 1,
            SinkEvent::WorkerFinished(5) => break,
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(results, 3);

    sink.stop().unwrap();
    drain_until_terminated(&events);
    reactor.join().unwrap();
}

#[test]
fn test_pause_then_resume_emits_every_item_once() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    const COUNT: u64 = 40;
    sink.start_worker(1, format!(r#"{{"count":{},"interval_ms":20,"finish":true}}"#, COUNT).into_bytes())
        .unwrap();

    let mut seqs = Vec::new();
    seqs.push(next_seq(&events, 1));

    sink.pause(Some(1)).unwrap();
    // Let anything already in flight arrive
    thread::sleep(Duration::from_millis(300));
    while let Ok(event) = events.try_recv() {
        seqs.push(seq_of(event, 1));
    }
    assert!((seqs.len() as u64) < COUNT, "job ran to completion before the pause");

    assert!(
        events.recv_timeout(Duration::from_millis(500)).is_err(),
        "paused worker kept producing"
    );

    sink.resume(Some(1)).unwrap();
    loop {
        match next_event(&events) {
            SinkEvent::WorkerFinished(1) => break,
            event => seqs.push(seq_of(event, 1)),
        }
    }
    assert_eq!(seqs, (0..COUNT).collect::<Vec<_>>());

    sink.stop().unwrap();
    drain_until_terminated(&events);
    reactor.join().unwrap();
}

#[test]
fn test_stop_reaches_paused_worker_without_resuming() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    sink.start_worker(1, count_job(10_000, 20)).unwrap();
    assert!(matches!(next_event(&events), SinkEvent::Result { worker_id: 1, .. }));

    sink.pause(None).unwrap();
    thread::sleep(Duration::from_millis(300));
    while events.try_recv().is_ok() {}

    sink.stop().unwrap();
    let remaining = drain_until_terminated(&events);
    assert_eq!(remaining, vec![SinkEvent::WorkerStopped(1)]);
    reactor.join().unwrap();
}

#[test]
fn test_stop_single_worker_leaves_others_running() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    sink.start_worker(1, b"one".to_vec()).unwrap();
    sink.start_worker(2, b"two".to_vec()).unwrap();
    let mut started = 0;
    while started < 2 {
        if let SinkEvent::Result { .. } = next_event(&events) {
            started += 1;
        }
    }

    sink.stop_worker(1).unwrap();
    loop {
        match next_event(&events) {
            SinkEvent::WorkerStopped(1) => break,
            SinkEvent::WorkerStopped(other) => panic!("worker {} stopped too", other),
            _ => {}
        }
    }

    sink.send_to_worker(Some(2), b"still-here".to_vec()).unwrap();
    assert_eq!(
        next_event(&events),
        SinkEvent::Result {
            worker_id: 2,
            record: b"still-here".to_vec()
        }
    );

    sink.stop().unwrap();
    let remaining = drain_until_terminated(&events);
    assert_eq!(stopped_workers(&remaining), BTreeSet::from([2]));
    reactor.join().unwrap();
}

#[test]
fn test_terminate_kills_without_acknowledgment() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    sink.start_worker(1, count_job(10_000, 10)).unwrap();
    assert!(matches!(next_event(&events), SinkEvent::Result { worker_id: 1, .. }));

    let started = Instant::now();
    sink.terminate().unwrap();
    let remaining = drain_until_terminated(&events);
    assert!(stopped_workers(&remaining).is_empty());
    assert!(started.elapsed() < EVENT_TIMEOUT);
    reactor.join().unwrap();
}

#[test]
fn test_kill_breaks_reactor_loop() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(PoolBroadcast::new()), demo_worker("pool-counter")).unwrap();

    sink.start_worker(1, b"hello".to_vec()).unwrap();
    assert!(matches!(next_event(&events), SinkEvent::Result { worker_id: 1, .. }));

    sink.kill().unwrap();
    drain_until_terminated(&events);
    reactor.join().unwrap();
    assert!(sink.send_to_worker(Some(1), b"late".to_vec()).is_err());
}

#[test]
fn test_force_terminate_all_counts() {
    for count in [0u32, 1, 5] {
        let mut supervisor = Supervisor::new("force-terminate-test", Duration::from_secs(2));
        for worker_id in 0..count {
            supervisor
                .spawn(worker_id, &WorkerCommand::new("sleep").arg("30"))
                .unwrap();
        }

        let report = supervisor.force_terminate_all(Duration::from_secs(2));
        assert_eq!(report.total(), count as usize);
        assert_eq!(report.killed, 0);
        assert!(supervisor.is_empty());
    }
}

#[test]
fn test_daemon_streams_records_in_order() {
    let (sink, events, reactor) =
        ResultSink::spawn(test_config(), Box::new(SingleDaemon::new()), demo_worker("daemon-echo")).unwrap();

    sink.start().unwrap();
    for i in 0..20 {
        sink.send_to_worker(None, format!("record-{}", i).into_bytes())
            .unwrap();
    }

    for i in 0..20 {
        assert_eq!(
            next_event(&events),
            SinkEvent::Result {
                worker_id: 0,
                record: format!("record-{}", i).into_bytes()
            }
        );
    }

    sink.stop().unwrap();
    let remaining = drain_until_terminated(&events);
    assert_eq!(stopped_workers(&remaining), BTreeSet::from([0]));
    reactor.join().unwrap();
}

#[test]
fn test_crashed_worker_is_reported_during_shutdown() {
    let (sink, events, reactor) = ResultSink::spawn(
        test_config(),
        Box::new(SingleDaemon::new()),
        // Exits at once without acknowledging anything
        WorkerCommand::new("true"),
    )
    .unwrap();

    sink.start().unwrap();
    thread::sleep(Duration::from_millis(300));
    sink.stop().unwrap();

    let remaining = drain_until_terminated(&events);
    assert_eq!(remaining, vec![SinkEvent::WorkerCrashed(0)]);
    reactor.join().unwrap();
}

#[test]
fn test_data_for_dead_daemon_does_not_stall_the_reactor() {
    let (sink, events, reactor) = ResultSink::spawn(
        test_config(),
        Box::new(SingleDaemon::new()),
        // Never connects to the ventilator
        WorkerCommand::new("true"),
    )
    .unwrap();

    sink.start().unwrap();
    thread::sleep(Duration::from_millis(300));
    sink.send_to_worker(None, b"nobody-listens".to_vec()).unwrap();
    assert_eq!(next_event(&events), SinkEvent::WorkerCrashed(0));

    // Later records are refused, not queued behind the dead worker
    sink.send_to_worker(None, b"still-nobody".to_vec()).unwrap();
    sink.kill().unwrap();
    let started = Instant::now();
    assert!(drain_until_terminated(&events).is_empty());
    assert!(started.elapsed() < EVENT_TIMEOUT);
    reactor.join().unwrap();
}

#[test]
fn test_worker_logs_reach_collector() {
    let config = test_config();
    let (forward, records) = channel::unbounded();
    let mut collector = LogCollector::spawn(&config, Some(forward)).unwrap();

    let (sink, events, reactor) = ResultSink::spawn_with_log_collector(
        config,
        Box::new(SingleDaemon::new()),
        demo_worker("daemon-echo"),
        Some(collector.info_endpoint().to_string()),
    )
    .unwrap();
    sink.start().unwrap();

    // Records logged before the collector subscribed are lost; keep the worker talking
    let deadline = Instant::now() + EVENT_TIMEOUT;
    let mut record = None;
    while record.is_none() && Instant::now() < deadline {
        sink.send_to_worker(None, b"log me".to_vec()).unwrap();
        record = records
            .recv_timeout(Duration::from_millis(100))
            .ok()
            .filter(|r| r.component == "demo-worker-0");
    }
    let record = record.expect("no worker log record collected");
    assert_eq!(record.level, "INFO");

    // Logging keeps a publisher open for the life of the worker; the
    // acknowledgment must still get out before the process exits
    sink.stop().unwrap();
    let remaining = drain_until_terminated(&events);
    assert!(!remaining.contains(&SinkEvent::WorkerCrashed(0)));
    assert_eq!(stopped_workers(&remaining), BTreeSet::from([0]));
    reactor.join().unwrap();
    collector.stop();
}
