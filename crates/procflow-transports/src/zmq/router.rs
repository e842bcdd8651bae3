// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ ROUTER endpoint
//!
//! ROUTER sockets prefix every message with the sending peer's identity,
//! which lets the load balancer route each task to one chosen worker.
//! Frames from a REQ peer: `[identity, "", worker_id, tag, body]`.

use super::socket::SocketCore;
use crate::common::{Envelope, TransportError, TransportResult};
use crate::traits::RouterServer;

/// ZMQ ROUTER socket implementation
pub struct ZmqRouter {
    core: SocketCore,
}

zmq_endpoint!(ZmqRouter, ::zmq::ROUTER, "ROUTER", "zmq-router");

fn split_routed(mut frames: Vec<Vec<u8>>) -> TransportResult<(Vec<u8>, Envelope)> {
    if frames.len() < 2 || !frames[1].is_empty() {
        return Err(TransportError::InvalidMessage(format!(
            "Expected [identity, empty delimiter, ...], got {} frames",
            frames.len()
        )));
    }
    let envelope_frames = frames.split_off(2);
    let identity = frames.swap_remove(0);
    Ok((identity, Envelope::from_frames(envelope_frames)?))
}

impl RouterServer for ZmqRouter {
    fn recv_routed(&self) -> TransportResult<(Vec<u8>, Envelope)> {
        split_routed(self.core.recv_frames(None)?)
    }

    fn try_recv_routed(&self) -> TransportResult<Option<(Vec<u8>, Envelope)>> {
        self.core.try_recv_frames()?.map(split_routed).transpose()
    }

    fn send_routed(&self, identity: &[u8], envelope: &Envelope) -> TransportResult<()> {
        let mut frames = Vec::with_capacity(5);
        frames.push(identity.to_vec());
        frames.push(Vec::new());
        frames.extend(envelope.to_frames());
        self.core.send_frames(frames, 0)
    }
}
