// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ZMQ PULL endpoint
//!
//! PULL sockets fair-queue messages from every connected PUSH peer.

use super::socket::SocketCore;

/// ZMQ PULL socket implementation (receiver)
pub struct ZmqPull {
    core: SocketCore,
}

zmq_endpoint!(ZmqPull, ::zmq::PULL, "PULL", "zmq-pull");
zmq_envelope_receiver!(ZmqPull);
