// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for ZMQ endpoint pairs

use procflow_transports::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn started<T: Transport>(mut endpoint: T) -> T {
    endpoint.start().unwrap();
    endpoint
}

#[test]
fn test_push_pull_preserves_order() {
    let context = Arc::new(zmq::Context::new());
    let pull = started(ZmqPull::new(Arc::clone(&context), TransportConfig::bind("tcp://127.0.0.1:*")).unwrap());
    let address = pull.endpoint().unwrap();

    let sender = thread::spawn(move || {
        let context = Arc::new(zmq::Context::new());
        let push = started(ZmqPush::new(context, TransportConfig::connect(address)).unwrap());
        for i in 0..20u32 {
            push.send_envelope(&Envelope::json(Some(4), &i).unwrap()).unwrap();
        }
        push.send_envelope(&Envelope::command(Some(4), Command::Finished)).unwrap();
        // Let queued frames flush before the socket closes
        thread::sleep(Duration::from_millis(200));
    });

    for expected in 0..20u32 {
        let envelope = pull.recv_envelope_timeout(WAIT).unwrap();
        assert_eq!(envelope.worker_id, Some(4));
        assert_eq!(envelope.decode::<u32>().unwrap(), expected);
    }
    let last = pull.recv_envelope_timeout(WAIT).unwrap();
    assert!(last.is_command(Command::Finished));

    sender.join().unwrap();
}

#[test]
fn test_pub_sub_prefix_filter() {
    let context = Arc::new(zmq::Context::new());
    let publisher = started(ZmqPub::new(Arc::clone(&context), TransportConfig::bind("tcp://127.0.0.1:*")).unwrap());
    let address = publisher.endpoint().unwrap();

    let subscriber = started(ZmqSub::new(Arc::clone(&context), TransportConfig::connect(address)).unwrap());
    subscriber.subscribe(&Envelope::topic_for(1)).unwrap();

    // Slow-joiner: keep publishing until the subscription is live
    let mut first = None;
    for _ in 0..100 {
        publisher.send_envelope(&Envelope::command(Some(1), Command::Start)).unwrap();
        if let Some(envelope) = subscriber.try_recv_envelope().unwrap() {
            first = Some(envelope);
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(first.unwrap().is_command(Command::Start));

    publisher.send_envelope(&Envelope::data(Some(2), b"for two".to_vec())).unwrap();
    publisher.send_envelope(&Envelope::data(Some(12), b"for twelve".to_vec())).unwrap();
    publisher.send_envelope(&Envelope::data(Some(1), b"for one".to_vec())).unwrap();

    let mut data = Vec::new();
    while data.len() < 2 {
        let envelope = subscriber.recv_envelope_timeout(WAIT).unwrap();
        // Late duplicates of the probe
        if envelope.is_command(Command::Start) {
            continue;
        }
        data.push(envelope);
    }

    // "1" is a prefix of "12": the filter lets it through, the id tells them apart
    assert_eq!(data[0].worker_id, Some(12));
    assert_eq!(data[1].worker_id, Some(1));
    assert_eq!(data[1].body(), b"for one");
}

#[test]
fn test_req_rep_handshake() {
    let context = Arc::new(zmq::Context::new());
    let rep = started(ZmqRep::new(Arc::clone(&context), TransportConfig::bind("tcp://127.0.0.1:*")).unwrap());
    let address = rep.endpoint().unwrap();

    let client = thread::spawn(move || {
        let context = Arc::new(zmq::Context::new());
        let req = started(ZmqReq::new(context, TransportConfig::connect(address)).unwrap());
        req.request_timeout(&Envelope::data(Some(3), Vec::new()), WAIT).unwrap()
    });

    let request = rep.recv_request_timeout(WAIT).unwrap();
    assert_eq!(request.worker_id, Some(3));
    rep.reply(&Envelope::data(None, Vec::new())).unwrap();

    let reply = client.join().unwrap();
    assert_eq!(reply.body(), b"");
}

#[test]
fn test_router_routes_by_identity() {
    let context = Arc::new(zmq::Context::new());
    let router = started(ZmqRouter::new(Arc::clone(&context), TransportConfig::bind("tcp://127.0.0.1:*")).unwrap());
    let address = router.endpoint().unwrap();

    let workers: Vec<_> = (1..=2u32)
        .map(|id| {
            let address = address.clone();
            thread::spawn(move || {
                let context = Arc::new(zmq::Context::new());
                let config = TransportConfig::connect(address).with_identity(create_identity("Echo", id));
                let req = started(ZmqReq::new(context, config).unwrap());
                let task = req
                    .request_timeout(&Envelope::command(None, Command::Ready), WAIT)
                    .unwrap();
                // Echo the body back as the final message
                req.send_request(&Envelope::data(None, task.body().to_vec())).unwrap();
                thread::sleep(Duration::from_millis(200));
            })
        })
        .collect();

    let mut ready = Vec::new();
    for _ in 0..2 {
        let (identity, envelope) = router.recv_routed().unwrap();
        assert!(envelope.is_command(Command::Ready));
        ready.push(identity);
    }

    for identity in &ready {
        let id = worker_id_from_identity(identity).unwrap();
        router
            .send_routed(identity, &Envelope::data(None, format!("task-{}", id).into_bytes()))
            .unwrap();
    }

    for _ in 0..2 {
        let (identity, envelope) = router.recv_routed().unwrap();
        let id = worker_id_from_identity(&identity).unwrap();
        assert_eq!(envelope.body(), format!("task-{}", id).as_bytes());
    }

    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_inproc_and_poll_readable() {
    let context = Arc::new(zmq::Context::new());
    let control = started(ZmqPull::new(Arc::clone(&context), TransportConfig::bind("inproc://control-test")).unwrap());
    let results = started(ZmqPull::new(Arc::clone(&context), TransportConfig::bind("tcp://127.0.0.1:*")).unwrap());

    let ready = poll_readable(&[&control as &dyn Pollable, &results], Some(Duration::from_millis(10))).unwrap();
    assert_eq!(ready, vec![false, false]);

    let handoff = started(ZmqPush::new(Arc::clone(&context), TransportConfig::connect("inproc://control-test")).unwrap());
    handoff.send_envelope(&Envelope::command(None, Command::Stop)).unwrap();

    let ready = poll_readable(&[&control as &dyn Pollable, &results], Some(WAIT)).unwrap();
    assert_eq!(ready, vec![true, false]);
    assert!(control.try_recv_envelope().unwrap().unwrap().is_command(Command::Stop));
}
